use super::*;
use crate::loom::{self, sync::Arc, thread};
use core::ptr::{self, NonNull};
use std::{boxed::Box, vec::Vec};

struct Entry {
    links: Links<Entry>,
    depth: usize,
    val: usize,
    ready: bool,
}

unsafe impl Linked<Links<Self>> for Entry {
    type Handle = Box<Entry>;

    fn into_ptr(handle: Box<Entry>) -> NonNull<Entry> {
        NonNull::from(Box::leak(handle))
    }

    unsafe fn from_ptr(ptr: NonNull<Entry>) -> Box<Entry> {
        Box::from_raw(ptr.as_ptr())
    }

    unsafe fn links(target: NonNull<Entry>) -> NonNull<Links<Entry>> {
        NonNull::new_unchecked(ptr::addr_of_mut!((*target.as_ptr()).links))
    }
}

impl Ready for Entry {
    fn is_ready(&self) -> bool {
        self.ready
    }
}

impl Depth for Entry {
    fn depth(&self) -> usize {
        self.depth
    }
}

fn entry(val: usize, depth: usize) -> Box<Entry> {
    Box::new(Entry {
        links: Links::new(),
        depth,
        val,
        ready: true,
    })
}

fn drain<const SIZE: usize>(list: &HashedList<Entry, SIZE>) -> Vec<usize> {
    let mut vals = Vec::new();
    while let Some(e) = list.get_ready_any() {
        vals.push(e.val);
    }
    vals.sort_unstable();
    vals
}

#[cfg(not(loom))]
mod sequential {
    use super::*;
    use proptest::{collection::vec, prelude::*};

    #[test]
    fn is_send_sync() {
        crate::util::assert_send_sync::<HashedList<Entry, 16>>();
    }

    #[test]
    fn bounds_widen_on_push() {
        let _trace = crate::util::trace_init();
        let list = HashedList::<Entry, 16>::new();
        assert_eq!(list.bounds(), (0, 0));
        list.push(entry(0, 5));
        assert_eq!(list.bounds(), (0, 5));
        list.push(entry(1, 9));
        assert_eq!(list.bounds(), (0, 9));
        // depths wrap around the table
        list.push(entry(2, 16 + 3));
        assert_eq!(list.bounds(), (0, 9));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn scan_shrinks_bounds() {
        let _trace = crate::util::trace_init();
        let list = HashedList::<Entry, 16>::new();
        list.push(entry(0, 3));
        list.push(entry(1, 7));
        list.push(entry(2, 12));

        // the scan starts from the bottom of the bounds and narrows them
        assert_eq!(list.get_ready_any().map(|e| e.val), Some(0));
        assert_eq!(list.bounds(), (7, 12));
        assert_eq!(list.get_ready_any().map(|e| e.val), Some(1));
        assert_eq!(list.bounds(), (12, 12));
        assert_eq!(list.get_ready_any().map(|e| e.val), Some(2));
        assert!(list.get_ready_any().is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn probes_near_hint_first() {
        let _trace = crate::util::trace_init();
        let list = HashedList::<Entry, 16>::new();
        list.push(entry(0, 1));
        list.push(entry(1, 6));
        list.push(entry(2, 5));
        list.push(entry(3, 10));

        assert_eq!(list.get_ready(5).map(|e| e.val), Some(2));
        assert_eq!(list.get_ready(5).map(|e| e.val), Some(1));
        // nothing at 5 or 6 any more, so the scan finds the lowest bucket
        assert_eq!(list.get_ready(5).map(|e| e.val), Some(0));
        assert_eq!(list.get_ready(5).map(|e| e.val), Some(3));
        assert!(list.get_ready(5).is_none());
    }

    #[test]
    fn hint_wraps_around_table() {
        let list = HashedList::<Entry, 8>::new();
        list.push(entry(0, 3));
        list.push(entry(1, 8));
        // 7 and 8 hash to buckets 7 and 0
        assert_eq!(list.get_ready(7).map(|e| e.val), Some(1));
        assert_eq!(list.get_ready(7).map(|e| e.val), Some(0));
    }

    #[test]
    fn unready_elements_stay() {
        let _trace = crate::util::trace_init();
        let list = HashedList::<Entry, 16>::new();
        let mut waiting = entry(0, 2);
        waiting.ready = false;
        list.push(waiting);
        list.push(entry(1, 4));

        assert_eq!(list.get_ready_any().map(|e| e.val), Some(1));
        assert!(list.get_ready_any().is_none());
        assert_eq!(list.len(), 1);
        // the unready element's bucket must stay within bounds
        let (lo, hi) = list.bounds();
        assert!(lo <= 2 && 2 <= hi, "bounds {:?} exclude bucket 2", (lo, hi));
    }

    #[test]
    fn reset_bounds_recovers_exact_bounds() {
        let list = HashedList::<Entry, 16>::new();
        list.push(entry(0, 4));
        list.push(entry(1, 11));
        list.reset_bounds();
        assert_eq!(list.bounds(), (4, 11));
        assert_eq!(drain(&list), [0, 1]);
    }

    #[test]
    fn threaded_exactly_once() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 500;
        let _trace = crate::util::trace_init();

        let list = Arc::new(HashedList::<Entry, 64>::new());
        let producers = (0..PRODUCERS)
            .map(|p| {
                let list = list.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let val = p * PER_PRODUCER + i;
                        list.push(entry(val, val * 7 % 200));
                    }
                })
            })
            .collect::<Vec<_>>();

        let taken = Arc::new(crate::loom::atomic::AtomicUsize::new(0));
        let consumers = (0..CONSUMERS)
            .map(|c| {
                let list = list.clone();
                let taken = taken.clone();
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    let mut hint = c;
                    while taken.load(SeqCst) < PRODUCERS * PER_PRODUCER {
                        if let Some(e) = list.get_ready(hint) {
                            hint = e.depth;
                            mine.push(e.val);
                            taken.fetch_add(1, SeqCst);
                        } else {
                            thread::yield_now();
                        }
                    }
                    mine
                })
            })
            .collect::<Vec<_>>();

        for p in producers {
            p.join().unwrap();
        }
        let mut all = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect::<Vec<_>>();
        all.sort_unstable();
        assert_eq!(all, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
        assert!(list.is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(usize),
        Get(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..100usize).prop_map(Op::Push),
            (0..100usize).prop_map(Op::Get),
        ]
    }

    proptest! {
        #[test]
        fn every_element_returned_once(ops in vec(op(), 0..200)) {
            let list = HashedList::<Entry, 16>::new();
            let mut pushed = 0;
            let mut got = Vec::new();
            for op in ops {
                match op {
                    Op::Push(depth) => {
                        list.push(entry(pushed, depth));
                        pushed += 1;
                    }
                    Op::Get(hint) => {
                        // while anything is queued, a removal must find it
                        let item = list.get_ready(hint);
                        prop_assert_eq!(item.is_some(), got.len() < pushed);
                        got.extend(item.map(|e| e.val));
                    }
                }
            }
            got.extend(drain(&list));
            got.sort_unstable();
            prop_assert_eq!(got, (0..pushed).collect::<Vec<_>>());
            prop_assert!(list.is_empty());
        }
    }
}

#[test]
fn concurrent_push_and_scan() {
    loom::model(|| {
        let list = Arc::new(HashedList::<Entry, 4>::new());
        list.push(entry(0, 1));

        let list2 = list.clone();
        let producer = thread::spawn(move || list2.push(entry(1, 3)));

        let mut got = Vec::new();
        got.extend(list.get_ready_any().map(|e| e.val));
        producer.join().unwrap();

        // whatever the scan saw, nothing may be lost to a stale bound
        got.extend(drain(&list));
        got.sort_unstable();
        assert_eq!(got, [0, 1]);
        assert!(list.is_empty());
    });
}
