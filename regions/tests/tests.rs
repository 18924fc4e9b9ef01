use regions::*;
use rand::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn counted<V: 'static>() -> (RegionTree<V>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let keys = Arc::new(AtomicUsize::new(0));
    let values = Arc::new(AtomicUsize::new(0));
    let (k, v) = (keys.clone(), values.clone());
    let tree = RegionTree::new()
        .on_drop_key(move |_| { k.fetch_add(1, Ordering::Relaxed); })
        .on_drop_value(move |_| { v.fetch_add(1, Ordering::Relaxed); });

    (tree, keys, values)
}

#[test]
fn containment_versus_exact_removal() {
    let mut t = RegionTree::new();
    t.insert(100, 200, ()).unwrap();

    assert_eq!(t.lookup(150).map(|n| n.start()), Some(100));
    assert!(!t.remove(150));
    assert_eq!(t.lookup(150).map(|n| n.start()), Some(100));
    assert!(t.remove(100));
    assert!(t.lookup(150).is_none());
}

#[test]
fn disjoint_regions() {
    let mut t = RegionTree::new();
    t.insert(100, 200, 'a').unwrap();
    t.insert(300, 400, 'b').unwrap();

    assert!(t.lookup(250).is_none());
    assert_eq!(t.lookup(199).map(|n| n.start()), Some(100));
    assert_eq!(t.lookup(300).map(|n| n.start()), Some(300));
    assert!(t.lookup(200).is_none());
    assert!(t.lookup(99).is_none());
    assert!(t.lookup(400).is_none());
    assert_eq!(t.lookup(399).unwrap().offset_of(399), 99);

    let hit = t.lookup(150).unwrap();
    assert_eq!((hit.start(), hit.end()), (100, 200));
    assert_eq!(hit.span(), Span::new(100, 200));
}

#[test]
fn reinsert_replaces_payload() {
    let seen = Arc::new(Mutex::new(vec![]));
    let s = seen.clone();
    let mut t = RegionTree::new().on_drop_value(move |v: &'static str| s.lock().unwrap().push(v));
    t.insert(10, 20, "first").unwrap();
    t.insert(40, 50, "other").unwrap();
    let node = t.insert(10, 20, "second").unwrap();
    assert_eq!(*node.value(), "second");

    assert_eq!(t.len(), 2);
    assert_eq!(*t.lookup(15).unwrap().value(), "second");
    assert_eq!(*seen.lock().unwrap(), vec!["first"]);
}

#[test]
fn foreach_in_order_with_early_exit() {
    let mut t = RegionTree::new();
    // Insert out of order so the shape differs from the key order.
    t.insert(50, 60, 3).unwrap();
    t.insert(10, 20, 1).unwrap();
    t.insert(30, 40, 2).unwrap();

    let mut visited = vec![];
    assert_eq!(t.foreach(|n| { visited.push(n.start()); 0 }), 0);
    assert_eq!(visited, vec![10, 30, 50]);

    let mut visited = vec![];
    let signal = t.foreach(|n| {
        visited.push(n.start());
        if *n.value() == 2 { 0xdead } else { 0 }
    });
    assert_eq!(signal, 0xdead);
    assert_eq!(visited, vec![10, 30]);
}

#[test]
fn foreach_does_not_restructure() {
    let mut t = RegionTree::new();
    for low in [5u64, 1, 9, 3, 7] {
        t.insert(low, low + 1, ()).unwrap();
    }
    let root = t.root().unwrap().start();
    let height = t.height();
    t.foreach(|_| 0);
    assert_eq!(t.root().unwrap().start(), root);
    assert_eq!(t.height(), height);
}

#[test]
fn lookup_splays_hit_or_last_visited() {
    let mut t = RegionTree::new();
    for low in (0..20u64).map(|i| i * 100) {
        t.insert(low, low + 50, ()).unwrap();
    }
    t.lookup(725).unwrap();
    assert_eq!(t.root().unwrap().start(), 700);

    // 1060 sits in the gap between [1000, 1050) and [1100, 1150).
    assert!(t.lookup(1060).is_none());
    let root = t.root().unwrap().start();
    assert!(root == 1000 || root == 1100);
    assert!(t.is_ordered());
}

#[test]
fn remove_splays_neighbour_when_absent() {
    let mut t = RegionTree::new();
    for low in (0..20u64).map(|i| i * 100) {
        t.insert(low, low + 50, ()).unwrap();
    }
    t.lookup(0).unwrap();
    assert!(!t.remove(1010));
    let root = t.root().unwrap().start();
    assert!(root == 1000 || root == 1100);
    assert_eq!(t.len(), 20);

    assert!(t.remove(1000));
    assert_eq!(t.len(), 19);
    assert!(t.is_ordered());
}

#[test]
fn chain_teardown_fires_hooks_once() {
    const N: u64 = 20_000;
    let (mut t, keys, values) = counted::<u64>();
    // Ascending inserts leave a left-leaning chain.
    for i in 0..N {
        t.insert(i * 16, i * 16 + 8, i).unwrap();
    }
    assert_eq!(t.height(), N as usize);

    let mut visited = 0;
    t.foreach(|_| { visited += 1; 0 });
    assert_eq!(visited, N);

    t.destroy();
    assert_eq!(keys.load(Ordering::Relaxed), N as usize);
    assert_eq!(values.load(Ordering::Relaxed), N as usize);
}

#[test]
fn remove_fires_hooks_take_does_not() {
    let (mut t, keys, values) = counted::<u32>();
    t.insert(0, 10, 1).unwrap();
    t.insert(10, 20, 2).unwrap();
    assert!(t.remove(0));
    assert_eq!(keys.load(Ordering::Relaxed), 1);
    assert_eq!(values.load(Ordering::Relaxed), 1);

    assert_eq!(t.take(10), Some((Span::new(10, 20), 2)));
    assert_eq!(keys.load(Ordering::Relaxed), 1);
    assert_eq!(values.load(Ordering::Relaxed), 1);
}

#[test]
fn drop_releases_payloads() {
    let payload = Arc::new(());
    {
        let mut t = RegionTree::new();
        for i in 0..64u64 {
            t.insert(i * 2, i * 2 + 1, payload.clone()).unwrap();
        }
        assert_eq!(Arc::strong_count(&payload), 65);
    }
    assert_eq!(Arc::strong_count(&payload), 1);
}

#[test]
fn randomized_against_btreemap() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut t = RegionTree::new();
    let mut model: BTreeMap<u64, (u64, u32)> = BTreeMap::new();

    for round in 0..5_000u32 {
        // Slots of 64 bytes; a region never leaves its slot.
        let slot = rng.gen_range(0..512u64) * 64;
        match rng.gen_range(0..3) {
            0 => {
                let len = rng.gen_range(1..=64u64);
                let res = t.insert(slot, slot + len, round);
                match model.get(&slot) {
                    Some(&(high, _)) if high == slot + len => {
                        assert!(res.is_ok());
                        model.insert(slot, (high, round));
                    },
                    Some(_) => {
                        assert!(matches!(res, Err(RegionError::Overlap { .. })));
                    },
                    None => {
                        assert!(res.is_ok());
                        model.insert(slot, (slot + len, round));
                    }
                }
            },
            1 => {
                let removed = t.remove(slot);
                assert_eq!(removed, model.remove(&slot).is_some());
            },
            _ => {
                let addr = slot + rng.gen_range(0..64u64);
                let expected = model.range(..=addr)
                    .next_back()
                    .filter(|(_, &(high, _))| addr < high)
                    .map(|(&low, &(_, v))| (low, v));
                let got = t.lookup(addr).map(|n| (n.start(), *n.value()));
                assert_eq!(got, expected);
                if got.is_some() {
                    assert_eq!(t.root().unwrap().start(), expected.unwrap().0);
                }
            }
        }
        assert_eq!(t.len(), model.len());
    }

    assert!(t.is_ordered());
    let walked: Vec<u64> = t.iter().map(|n| n.start()).collect();
    let expected: Vec<u64> = model.keys().copied().collect();
    assert_eq!(walked, expected);
}

#[test]
fn pooled_tree_reports_exhaustion() {
    let mut t: RegionTree<u32, NodePool<u32>> = RegionTree::pooled(3);
    t.insert(0, 10, 0).unwrap();
    t.insert(10, 20, 1).unwrap();
    t.insert(20, 30, 2).unwrap();
    assert!(matches!(t.insert(30, 40, 3), Err(RegionError::Alloc { .. })));
    // Updates need no new node.
    t.insert(10, 20, 11).unwrap();
    assert_eq!(t.allocator().in_use(), 3);

    assert!(t.remove(0));
    assert_eq!(t.allocator().in_use(), 2);
    t.insert(30, 40, 3).unwrap();
    assert_eq!(t.lookup(35).map(|n| *n.value()), Some(3));

    t.clear();
    assert_eq!(t.allocator().in_use(), 0);
}

#[test]
fn libc_backed_tree() {
    let mut t = RegionTree::new_in(Libc);
    for i in 0..1_000u64 {
        t.insert(i * 4096, i * 4096 + 4000, i).unwrap();
    }
    assert_eq!(t.lookup(4096 * 500 + 12).map(|n| *n.value()), Some(500));
    assert!(t.lookup(4096 * 500 + 4000).is_none());
}

fn reversed(region: &Span, query: &Span) -> Overlap {
    // Descending address order.
    match compare_interval(region, query) {
        Overlap::Below  => Overlap::Above,
        Overlap::Above  => Overlap::Below,
        o               => o,
    }
}

fn reversed_start(region: &Span, addr: u64) -> std::cmp::Ordering {
    region.low.cmp(&addr)
}

#[test]
fn custom_comparators_drive_order() {
    let mut t = RegionTree::ordered_by(reversed, reversed_start);
    for low in [10u64, 30, 20] {
        t.insert(low, low + 5, ()).unwrap();
    }
    let walked: Vec<u64> = t.iter().map(|n| n.start()).collect();
    assert_eq!(walked, vec![30, 20, 10]);
    assert_eq!(t.lookup(22).map(|n| n.start()), Some(20));
    assert!(t.remove(20));
    assert!(t.lookup(22).is_none());
}

#[test]
fn custom_comparators_with_pooled_nodes() {
    let mut t: RegionTree<u8, NodePool<u8>> =
        RegionTree::ordered_by_in(Pool::new(4), reversed, reversed_start);
    for (i, low) in [0u64, 100, 50, 150].into_iter().enumerate() {
        t.insert(low, low + 10, i as u8).unwrap();
    }
    assert!(matches!(t.insert(200, 210, 4), Err(RegionError::Alloc { .. })));
    let walked: Vec<u64> = t.iter().map(|n| n.start()).collect();
    assert_eq!(walked, vec![150, 100, 50, 0]);
    assert_eq!(t.lookup(55).map(|n| *n.value()), Some(2));
}

#[test]
fn tree_moves_across_threads() {
    let mut t = RegionTree::new();
    t.insert(1, 2, String::from("x")).unwrap();
    let shared = Arc::new(Mutex::new(t));
    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let s = shared.clone();
            std::thread::spawn(move || {
                let low = 100 * (i + 1);
                s.lock().unwrap().insert(low, low + 10, i.to_string()).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(shared.lock().unwrap().len(), 5);
}
