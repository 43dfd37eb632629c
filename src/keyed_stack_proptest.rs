#![cfg(test)]

// Property tests for KeyedStack kept inside the crate so they can check the
// shared state's structural invariants after every step.

use crate::{KeyedStack, StackError};
use proptest::prelude::*;

// Two handles live side by side so copies, forks and cross-handle
// independence are all exercised. Handle and key indices shrink toward 0.
#[derive(Clone, Debug)]
enum Op {
    Push(usize, u8, i32),
    Pop(usize),
    PopKey(usize, u8),
    TopMut(usize, i32),
    TopOfMut(usize, u8, i32),
    CloneInto(usize, usize),
    Take(usize, usize),
    Clear(usize),
}

const HANDLES: usize = 2;

fn arb_op() -> impl Strategy<Value = Op> {
    let h = 0..HANDLES;
    let k = 0u8..5;
    prop_oneof![
        4 => (h.clone(), k.clone(), any::<i32>()).prop_map(|(h, k, v)| Op::Push(h, k, v)),
        2 => h.clone().prop_map(Op::Pop),
        2 => (h.clone(), k.clone()).prop_map(|(h, k)| Op::PopKey(h, k)),
        2 => (h.clone(), -5i32..5).prop_map(|(h, d)| Op::TopMut(h, d)),
        2 => (h.clone(), k, -5i32..5).prop_map(|(h, k, d)| Op::TopOfMut(h, k, d)),
        2 => (h.clone(), h.clone()).prop_map(|(a, b)| Op::CloneInto(a, b)),
        1 => (h.clone(), h.clone()).prop_map(|(a, b)| Op::Take(a, b)),
        1 => h.prop_map(Op::Clear),
    ]
}

fn model_top_of(model: &[(u8, i32)], k: u8) -> Option<usize> {
    model.iter().rposition(|&(mk, _)| mk == k)
}

fn check(sut: &KeyedStack<u8, i32>, model: &[(u8, i32)]) -> Result<(), TestCaseError> {
    prop_assert!(sut.shared_state().check_invariants().is_ok(),
        "{:?}", sut.shared_state().check_invariants());
    prop_assert_eq!(sut.len(), model.len());
    prop_assert_eq!(sut.is_empty(), model.is_empty());

    match model.last() {
        Some((k, v)) => prop_assert_eq!(sut.top(), Ok((k, v))),
        None => prop_assert_eq!(sut.top(), Err(StackError::EmptyStack)),
    }

    let expected: Vec<(u8, i32)> = model.iter().rev().copied().collect();
    let actual: Vec<(u8, i32)> = sut.iter().map(|(k, v)| (*k, *v)).collect();
    prop_assert_eq!(actual, expected);

    let mut distinct: Vec<u8> = model.iter().map(|&(k, _)| k).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let keys: Vec<u8> = sut.keys().copied().collect();
    prop_assert_eq!(&keys, &distinct);

    for k in 0u8..5 {
        let n = model.iter().filter(|&&(mk, _)| mk == k).count();
        prop_assert_eq!(sut.count(&k), n);
        match model_top_of(model, k) {
            Some(i) => prop_assert_eq!(sut.top_of(&k), Ok(&model[i].1)),
            None => prop_assert_eq!(sut.top_of(&k), Err(StackError::KeyNotFound)),
        }
    }
    Ok(())
}

// Property: state-machine equivalence against a Vec<(K, V)> model per handle.
// Invariants exercised across random operation sequences:
// - SharedState::check_invariants passes after every step on every handle.
// - len/top/top_of/count/keys/iter agree with the model.
// - Copies are independent: mutating one handle (including through a lent
//   &mut V) never changes what another handle observes.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(ops in proptest::collection::vec(arb_op(), 1..80)) {
        let mut sut: Vec<KeyedStack<u8, i32>> = (0..HANDLES).map(|_| KeyedStack::new()).collect();
        let mut model: Vec<Vec<(u8, i32)>> = vec![Vec::new(); HANDLES];

        for op in ops {
            match op {
                Op::Push(h, k, v) => {
                    sut[h].push(k, v);
                    model[h].push((k, v));
                }
                Op::Pop(h) => {
                    let expected = model[h].pop().ok_or(StackError::EmptyStack);
                    prop_assert_eq!(sut[h].pop(), expected);
                }
                Op::PopKey(h, k) => match model_top_of(&model[h], k) {
                    Some(i) => {
                        let (_k, v) = model[h].remove(i);
                        prop_assert_eq!(sut[h].pop_key(&k), Ok(v));
                    }
                    None => prop_assert_eq!(sut[h].pop_key(&k), Err(StackError::KeyNotFound)),
                },
                Op::TopMut(h, d) => match model[h].last_mut() {
                    Some((mk, mv)) => {
                        let (k, v) = sut[h].top_mut().unwrap();
                        prop_assert_eq!(*k, *mk);
                        *v = v.wrapping_add(d);
                        *mv = mv.wrapping_add(d);
                    }
                    None => prop_assert_eq!(sut[h].top_mut().err(), Some(StackError::EmptyStack)),
                },
                Op::TopOfMut(h, k, d) => match model_top_of(&model[h], k) {
                    Some(i) => {
                        let v = sut[h].top_of_mut(&k).unwrap();
                        *v = v.wrapping_add(d);
                        model[h][i].1 = model[h][i].1.wrapping_add(d);
                    }
                    None => prop_assert_eq!(sut[h].top_of_mut(&k).err(), Some(StackError::KeyNotFound)),
                },
                Op::CloneInto(src, dst) => {
                    sut[dst] = sut[src].clone();
                    model[dst] = model[src].clone();
                }
                Op::Take(src, dst) => {
                    let taken = std::mem::take(&mut sut[src]);
                    sut[dst] = taken;
                    let taken = std::mem::take(&mut model[src]);
                    model[dst] = taken;
                }
                Op::Clear(h) => {
                    sut[h].clear();
                    model[h].clear();
                }
            }

            for (s, m) in sut.iter().zip(model.iter()) {
                check(s, m)?;
            }
        }
    }
}

// Property: KeyIds are handed out by a counter that only moves forward,
// whatever sequence of pushes and pops preceded a registration.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_key_ids_never_reused(ops in proptest::collection::vec((any::<bool>(), 0u8..4), 1..60)) {
        let mut s: KeyedStack<u8, ()> = KeyedStack::new();
        let mut seen = std::collections::BTreeSet::new();
        for (push, k) in ops {
            if push {
                let fresh = !s.contains_key(&k);
                s.push(k, ());
                let id = s.shared_state().lookup(&k).unwrap();
                if fresh {
                    prop_assert!(seen.insert(id), "id {:?} reused", id);
                    prop_assert!(seen.iter().all(|&old| old <= id));
                }
            } else {
                let _ = s.pop_key(&k);
            }
        }
    }
}
