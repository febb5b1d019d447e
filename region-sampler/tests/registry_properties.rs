//! Property tests for listener registration.
//!
//! Arbitrary interleavings of add, remove, death and sample requests must
//! leave the sampler's registry holding exactly the listeners a simple set
//! model says are registered.

use proptest::prelude::*;
use region_sampler::{
    Compositor, FnListener, ListenerHandle, Rect, RegionSampler, SamplingConfig, SceneLayer,
    SyntheticCompositor,
};
use std::collections::HashSet;
use std::sync::Arc;

const LISTENERS: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Add(usize, Rect),
    Remove(usize),
    Died(usize),
    Request,
}

fn arb_rect() -> impl Strategy<Value = Rect> {
    (0i32..40, 0i32..40, 0i32..40, 0i32..40)
        .prop_map(|(left, top, width, height)| Rect::new(left, top, left + width, top + height))
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..LISTENERS, arb_rect()).prop_map(|(index, area)| Op::Add(index, area)),
        (0..LISTENERS).prop_map(Op::Remove),
        (0..LISTENERS).prop_map(Op::Died),
        Just(Op::Request),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Registration is keyed by listener identity: re-adding replaces,
    // and removal and death notices are idempotent
    #[test]
    fn prop_registry_matches_model(ops in prop::collection::vec(arb_op(), 0..40)) {
        let compositor = Arc::new(SyntheticCompositor::new(0));
        compositor.add_layer(SceneLayer::gray("content", Rect::new(0, 0, 80, 80), 128));
        let sampler = RegionSampler::new(
            Arc::clone(&compositor) as Arc<dyn Compositor>,
            &SamplingConfig::default(),
        )
        .unwrap();

        let handles: Vec<ListenerHandle> =
            (0..LISTENERS).map(|_| FnListener::handle(|_| {})).collect();
        let mut model: HashSet<usize> = HashSet::new();

        for op in &ops {
            match op {
                Op::Add(index, area) => {
                    sampler.add_listener(*area, None, &handles[*index]);
                    model.insert(*index);
                }
                Op::Remove(index) => {
                    sampler.remove_listener(&handles[*index]);
                    model.remove(index);
                }
                Op::Died(index) => {
                    sampler.on_listener_died(handles[*index].id());
                    model.remove(index);
                }
                Op::Request => sampler.request_sample(),
            }

            prop_assert_eq!(sampler.listener_count(), model.len());
        }

        for (index, handle) in handles.iter().enumerate() {
            prop_assert_eq!(sampler.is_registered(handle), model.contains(&index));
        }
    }

    #[test]
    fn prop_clones_share_registration(area in arb_rect(), other in arb_rect()) {
        let compositor = Arc::new(SyntheticCompositor::new(0));
        let sampler = RegionSampler::new(
            Arc::clone(&compositor) as Arc<dyn Compositor>,
            &SamplingConfig::default(),
        )
        .unwrap();

        let handle = FnListener::handle(|_| {});
        let clone = handle.clone();
        sampler.add_listener(area, None, &handle);
        sampler.add_listener(other, None, &clone);
        prop_assert_eq!(sampler.listener_count(), 1);

        sampler.remove_listener(&clone);
        prop_assert!(!sampler.is_registered(&handle));
    }
}
