//! Object registry, liveness sweeps, address lookup, and blends

use tpc_core::types::{MemoryDimensions, MemoryRef, SpaceTag};
use tpc_mem::{Error, MemoryObjectAllocator, MemorySpace, CONSTS_CONSUMER, IO_CONSUMER};

fn dims(vectors: usize) -> MemoryDimensions {
    MemoryDimensions::full(vectors, 4)
}

#[test]
fn test_sweep_frees_only_fully_consumed_objects() {
    let mut local = MemorySpace::heap(SpaceTag::Local, 16);
    let mut objs = MemoryObjectAllocator::new();

    objs.allocate_object(&mut local, "a", dims(4), &["conv1", "conv2"])
        .unwrap();
    objs.allocate_object(&mut local, "b", dims(4), &["conv2"]).unwrap();

    objs.consume_object("a", &["conv1"]).unwrap();
    objs.consume_object("b", &["conv2"]).unwrap();
    assert_eq!(objs.free_consumed_objects(&mut [&mut local]).unwrap(), 1);

    assert!(objs.has_object("a"));
    assert!(!objs.has_object("b"));
    assert!(matches!(
        objs.consume_object("b", &[]),
        Err(Error::NotFound { .. })
    ));
    assert_eq!(local.available(), 12);
}

#[test]
fn test_pinned_objects_survive_sweeps() {
    let mut dram0 = MemorySpace::heap(SpaceTag::Dram0, 8);
    let mut objs = MemoryObjectAllocator::new();
    objs.allocate_object(&mut dram0, "input", dims(2), &[IO_CONSUMER, "conv1"])
        .unwrap();

    objs.consume_object("input", &["conv1", IO_CONSUMER]).unwrap();
    objs.consume_all_objects(&[IO_CONSUMER, CONSTS_CONSUMER]);
    assert_eq!(objs.free_consumed_objects(&mut [&mut dram0]).unwrap(), 0);

    let input = objs.get_object("input").unwrap();
    assert!(input.is_pinned());
    assert!(input.consumers().contains(IO_CONSUMER));
    assert_eq!(dram0.available(), 6);
}

#[test]
fn test_sweep_ignores_spaces_not_listed() {
    let mut dram1 = MemorySpace::heap(SpaceTag::Dram1, 8);
    let mut local = MemorySpace::heap(SpaceTag::Local, 8);
    let mut objs = MemoryObjectAllocator::new();
    objs.allocate_object(&mut dram1, "w", dims(2), &[]).unwrap();
    objs.allocate_object(&mut local, "t", dims(2), &[]).unwrap();

    assert_eq!(objs.free_consumed_objects(&mut [&mut local]).unwrap(), 1);
    assert!(objs.has_object("w"));
    assert_eq!(dram1.available(), 6);
}

#[test]
fn test_duplicate_live_name_rejected() {
    let mut local = MemorySpace::heap(SpaceTag::Local, 8);
    let mut objs = MemoryObjectAllocator::new();
    objs.allocate_object(&mut local, "x", dims(1), &["l0"]).unwrap();
    let err = objs
        .allocate_object(&mut local, "x", dims(1), &["l1"])
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateName { ref name } if name == "x"));
    assert_eq!(local.available(), 7, "rejected allocation must not leak");

    // After the first 'x' is swept the name can be reused.
    objs.consume_all_objects(&["l0"]);
    objs.free_consumed_objects(&mut [&mut local]).unwrap();
    objs.allocate_object(&mut local, "x", dims(1), &["l1"]).unwrap();
}

#[test]
fn test_resolve_ref_reports_logical_offset() {
    let mut local = MemorySpace::heap(SpaceTag::Local, 8);
    let mut objs = MemoryObjectAllocator::new();

    // Fragment the space so 'frag' is split across two runs.
    objs.allocate_object(&mut local, "p", dims(2), &["l0"]).unwrap();
    objs.allocate_object(&mut local, "q", dims(3), &["l1"]).unwrap();
    objs.allocate_object(&mut local, "r", dims(2), &["l1"]).unwrap();
    objs.consume_all_objects(&["l0"]);
    objs.free_consumed_objects(&mut [&mut local]).unwrap();
    let frag = objs
        .allocate_object(&mut local, "frag", dims(3), &["l2"])
        .unwrap()
        .clone();
    assert_eq!(frag.span.runs().len(), 2);

    let (o, off) = objs
        .resolve_ref_to_object(MemoryRef::new(SpaceTag::Local, 7))
        .unwrap();
    assert_eq!(o.name, "frag");
    assert_eq!(off, 2);

    let (o, off) = objs
        .resolve_ref_to_object(MemoryRef::new(SpaceTag::Local, 3))
        .unwrap();
    assert_eq!(o.name, "q");
    assert_eq!(off, 1);

    assert!(objs
        .resolve_ref_to_object(MemoryRef::new(SpaceTag::Dram0, 0))
        .is_none());
}

#[test]
fn test_blend_reuses_addresses_without_touching_free_pool() {
    let mut local = MemorySpace::heap(SpaceTag::Local, 8);
    let mut objs = MemoryObjectAllocator::new();
    let lo = objs
        .allocate_object(&mut local, "lo", dims(2), &["concat"])
        .unwrap()
        .clone();
    let hi = objs
        .allocate_object(&mut local, "hi", dims(2), &["concat"])
        .unwrap()
        .clone();
    let before = local.free_ranges().unwrap().clone();

    let addresses: Vec<MemoryRef> = hi.span.iter().chain(lo.span.iter()).collect();
    let cat = objs
        .blend_objects("cat", dims(4), &["next"], &["lo", "hi"], &addresses)
        .unwrap()
        .clone();

    assert_eq!(local.free_ranges().unwrap(), &before);
    assert_eq!(cat.dims.vectors, cat.span.len());
    assert!(cat.is_blend());

    // Address lookup now resolves through the blend, in blend order.
    let (o, off) = objs
        .resolve_ref_to_object(MemoryRef::new(SpaceTag::Local, 0))
        .unwrap();
    assert_eq!(o.name, "cat");
    assert_eq!(off, 2);

    // Blendees remain visible by name but are superseded.
    assert_eq!(objs.get_object("lo").unwrap().superseded_by(), Some(cat.id));
}

#[test]
fn test_blend_returns_owned_addresses_once_when_freed() {
    let mut local = MemorySpace::heap(SpaceTag::Local, 8);
    let mut objs = MemoryObjectAllocator::new();
    let a = objs
        .allocate_object(&mut local, "a", dims(3), &["pad"])
        .unwrap()
        .clone();
    let addresses: Vec<MemoryRef> = a.span.iter().collect();
    objs.blend_objects("view", dims(3), &["next"], &["a"], &addresses)
        .unwrap();

    // Consuming the blendee alone must not free anything.
    objs.consume_all_objects(&["pad"]);
    assert_eq!(objs.free_consumed_objects(&mut [&mut local]).unwrap(), 0);
    assert_eq!(local.available(), 5);

    objs.consume_object("view", &["next"]).unwrap();
    assert_eq!(objs.free_consumed_objects(&mut [&mut local]).unwrap(), 1);
    assert_eq!(local.available(), 8);
    assert!(!objs.has_object("view"));
    assert!(!objs.has_object("a"));
}

#[test]
fn test_blend_inherits_sentinel_consumers() {
    let mut dram0 = MemorySpace::heap(SpaceTag::Dram0, 8);
    let mut objs = MemoryObjectAllocator::new();
    let x = objs
        .allocate_object(&mut dram0, "x", dims(2), &[IO_CONSUMER])
        .unwrap()
        .clone();
    let addresses: Vec<MemoryRef> = x.span.iter().collect();
    let view = objs
        .blend_objects("view", dims(2), &["next"], &["x"], &addresses)
        .unwrap()
        .clone();
    assert!(view.consumers().contains(IO_CONSUMER));
    assert!(view.consumers().contains("next"));

    objs.consume_all_objects(&["next"]);
    assert_eq!(objs.free_consumed_objects(&mut [&mut dram0]).unwrap(), 0);
    assert!(objs.has_object("x"));
    assert_eq!(dram0.available(), 6);
}

#[test]
fn test_blend_size_mismatch_rejected() {
    let mut local = MemorySpace::heap(SpaceTag::Local, 8);
    let mut objs = MemoryObjectAllocator::new();
    let a = objs
        .allocate_object(&mut local, "a", dims(2), &["x"])
        .unwrap()
        .clone();
    let addresses: Vec<MemoryRef> = a.span.iter().collect();
    let err = objs
        .blend_objects("v", dims(3), &[], &["a"], &addresses)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SpanSizeMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
    assert!(objs.get_object("a").unwrap().superseded_by().is_none());
}

#[test]
fn test_blend_unknown_blendee_is_not_found() {
    let mut objs = MemoryObjectAllocator::new();
    let refs = [MemoryRef::new(SpaceTag::Local, 0)];
    assert!(matches!(
        objs.blend_objects("v", dims(1), &[], &["ghost"], &refs),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_replay_is_deterministic() {
    fn run() -> Vec<(String, Vec<MemoryRef>)> {
        let mut local = MemorySpace::heap(SpaceTag::Local, 32);
        let mut objs = MemoryObjectAllocator::new();
        for layer in 0..10usize {
            let name = format!("t{layer}");
            let next = format!("l{}", layer + 1);
            objs.allocate_object(&mut local, &name, dims(1 + layer % 4), &[next.as_str()])
                .unwrap();
            objs.consume_all_objects(&[format!("l{layer}").as_str()]);
            objs.free_consumed_objects(&mut [&mut local]).unwrap();
        }
        objs.objects()
            .map(|o| (o.name.clone(), o.span.iter().collect()))
            .collect()
    }
    assert_eq!(run(), run());
}
