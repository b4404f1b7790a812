//! Integration tests: construct trees from access logs, look nodes up, refine and export.

use protoinfer::{
    dot_string, text_dump, AccessEvent, AccessLog, Diagnostic, LinkDirection, MemRegion,
    Message, MessageSet, MessageSetError, MsgTree, NodeFlags, PaddingRefiner, Region, Span,
    StackHashComparator, TreeError, TreeSnapshot,
};
use proptest::prelude::*;

fn log_of(events: &[(usize, u32)]) -> AccessLog {
    events.iter().map(|&(o, f)| AccessEvent::new(o, f)).collect()
}

fn run(start: usize, end: usize, fp: u32) -> Vec<(usize, u32)> {
    (start..=end).map(|o| (o, fp)).collect()
}

fn spans(tree: &MsgTree) -> Vec<(usize, usize)> {
    tree.leaf_spans().into_iter().map(|s| (s.l, s.r)).collect()
}

fn random_spans(size: usize, raw: &[(usize, usize)], max_len: usize) -> Vec<Span> {
    raw.iter()
        .map(|&(a, b)| {
            let l = a % size;
            let len = 1 + b % (size - l).min(max_len);
            Span::new(l, l + len - 1)
        })
        .collect()
}

fn assert_partition(tree: &MsgTree) {
    assert!(tree.check_validity(), "{:?}", tree.validity_issues());
    let leaves = tree.leaf_spans();
    assert_eq!(leaves.first().map(|s| s.l), Some(0));
    assert_eq!(leaves.last().map(|s| s.r), Some(tree.size() - 1));
    for w in leaves.windows(2) {
        assert_eq!(w[0].r + 1, w[1].l, "gap or overlap between {} and {}", w[0], w[1]);
    }
    for id in tree.preorder() {
        assert_ne!(tree[id].children().len(), 1, "single child under {}", tree[id].span());
    }
}

#[test]
fn test_two_runs_and_trailing_repeat() {
    // Two committed runs, then a lone re-visit of offset 0 under the first run's context.
    let mut events = run(0, 3, 0xa);
    events.extend(run(8, 12, 0xb));
    events.push((0, 0xa));
    let tree = MsgTree::construct(16, &log_of(&events), &StackHashComparator).expect("construct");
    assert_partition(&tree);
    // The lone access is a one-byte run and is committed like any other.
    assert_eq!(
        spans(&tree),
        vec![(0, 0), (1, 3), (4, 7), (8, 12), (13, 15)]
    );
    let spans_all: Vec<Span> = tree.preorder().into_iter().map(|id| tree[id].span()).collect();
    for (i, s) in spans_all.iter().enumerate() {
        assert!(!spans_all[i + 1..].contains(s), "duplicate node {}", s);
    }
}

#[test]
fn test_two_runs_without_repeat_fill_gaps() {
    let mut events = run(0, 3, 0xa);
    events.extend(run(8, 12, 0xb));
    let tree = MsgTree::construct(16, &log_of(&events), &StackHashComparator).expect("construct");
    assert_eq!(spans(&tree), vec![(0, 3), (4, 7), (8, 12), (13, 15)]);
}

#[test]
fn test_single_access_is_committed() {
    let tree = MsgTree::construct(8, &log_of(&[(5, 1)]), &StackHashComparator).expect("construct");
    assert_eq!(spans(&tree), vec![(0, 4), (5, 5), (6, 7)]);
}

#[test]
fn test_short_candidate_splits_containing_leaf() {
    let mut tree = MsgTree::new(13).expect("tree");
    tree.insert(Span::new(0, 6)).expect("insert");
    assert_eq!(spans(&tree), vec![(0, 6), (7, 12)]);
    tree.insert(Span::new(7, 11)).expect("insert");
    assert_eq!(spans(&tree), vec![(0, 6), (7, 11), (12, 12)]);
    assert!(tree.diagnostics().is_empty());
}

#[test]
fn test_commit_threshold() {
    for (len, committed) in [(1usize, true), (2, false), (3, false), (4, true), (5, true)] {
        let events = run(2, 2 + len - 1, 0x7);
        let tree =
            MsgTree::construct(16, &log_of(&events), &StackHashComparator).expect("construct");
        let expect_node = tree.find_region(Region::new(2, len)).is_some();
        assert_eq!(expect_node, committed, "run of {}", len);
        if !committed {
            assert_eq!(tree.node_count(), 1);
        }
    }
}

#[test]
fn test_revisits_do_not_break_runs() {
    let events = [(0, 1), (1, 1), (1, 1), (2, 1), (3, 1), (3, 1)];
    let tree = MsgTree::construct(8, &log_of(&events), &StackHashComparator).expect("construct");
    assert_eq!(spans(&tree), vec![(0, 3), (4, 7)]);
}

#[test]
fn test_context_change_breaks_run() {
    let mut events = run(0, 3, 1);
    events.extend(run(4, 7, 2));
    let tree = MsgTree::construct(12, &log_of(&events), &StackHashComparator).expect("construct");
    assert_eq!(spans(&tree), vec![(0, 3), (4, 7), (8, 11)]);
}

#[test]
fn test_noise_is_absorbed_during_construct() {
    // A confident field re-read one byte longer under another context.
    let mut events = run(0, 9, 1);
    events.extend(run(0, 10, 2));
    let tree = MsgTree::construct(32, &log_of(&events), &StackHashComparator).expect("construct");
    assert_eq!(spans(&tree), vec![(0, 9), (10, 31)]);
    assert!(matches!(
        tree.diagnostics(),
        [Diagnostic::NearDuplicateDiscarded { .. }]
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_partition_survives_random_insertion_orders(
        size in 8usize..128,
        raw in prop::collection::vec((any::<usize>(), any::<usize>()), 1..60),
    ) {
        let mut tree = MsgTree::new(size).expect("tree");
        for span in random_spans(size, &raw, 24) {
            let inserted = tree.insert(span);
            prop_assert!(inserted.is_ok(), "inserting {}: {:?}", span, inserted);
        }
        assert_partition(&tree);
    }

    #[test]
    fn test_random_logs_construct_valid_trees(
        size in 16usize..80,
        raw in prop::collection::vec((any::<usize>(), any::<usize>(), 0u32..4), 1..12),
    ) {
        let mut events = Vec::new();
        for &(a, b, fp) in &raw {
            let start = a % size;
            let len = 1 + b % (size - start).min(12);
            events.extend(run(start, start + len - 1, fp));
        }
        let tree = MsgTree::construct(size, &log_of(&events), &StackHashComparator);
        prop_assert!(tree.is_ok(), "{:?}", tree.as_ref().err());
        if let Ok(tree) = tree {
            assert_partition(&tree);
        }
    }

    #[test]
    fn test_lookup_round_trip(
        raw in prop::collection::vec((any::<usize>(), any::<usize>()), 1..30),
    ) {
        let mut tree = MsgTree::new(64).expect("tree");
        for span in random_spans(64, &raw, 16) {
            tree.insert(span).expect("insert");
        }
        for offset in 0..64 {
            let leaf = tree.find_node(offset).expect("leaf");
            prop_assert!(tree[leaf].is_leaf());
            prop_assert!(tree[leaf].span().contains_offset(offset));
        }
        for id in tree.preorder() {
            let s = tree[id].span();
            prop_assert_eq!(tree.find_region(Region::new(s.l, s.len())), Some(id));
        }
        prop_assert!(matches!(
            tree.find_node(64),
            Err(TreeError::OffsetOutOfRange { offset: 64, size: 64 })
        ), "find_node(64) should return OffsetOutOfRange");
    }

    #[test]
    fn test_reinserting_existing_nodes_changes_nothing(
        raw in prop::collection::vec((any::<usize>(), any::<usize>()), 1..25),
    ) {
        let mut tree = MsgTree::new(48).expect("tree");
        for span in random_spans(48, &raw, 12) {
            tree.insert(span).expect("insert");
        }
        let before: Vec<Span> = tree.preorder().into_iter().map(|id| tree[id].span()).collect();
        for &s in &before {
            tree.insert(s).expect("reinsert");
        }
        let after: Vec<Span> = tree.preorder().into_iter().map(|id| tree[id].span()).collect();
        prop_assert_eq!(after, before);
    }
}

#[test]
fn test_find_or_create_node() {
    let mut msg = Message::new("m", 0x2000, vec![0x55; 16]).expect("message");
    let id = msg
        .find_or_create_node(MemRegion::new(0x2004, 4))
        .expect("node");
    assert_eq!(msg.tree()[id].span(), Span::new(4, 7));
    let again = msg
        .find_or_create_node(MemRegion::new(0x2004, 4))
        .expect("node");
    assert_eq!(again, id);
    assert_eq!(msg.find_node(MemRegion::new(0x2004, 4)).expect("lookup"), Some(id));
    assert_eq!(msg.find_node(MemRegion::new(0x2004, 3)).expect("lookup"), None);
    assert_eq!(msg.find_node_at(0x2005).expect("leaf"), id);
    assert!(matches!(
        msg.find_or_create_node(MemRegion::new(0x200e, 4)),
        Err(TreeError::RegionOutOfRange { .. })
    ));
}

#[test]
fn test_padding_refiner_is_idempotent() {
    let raw = vec![1, 2, 3, 4, 0, 0, 0, 0, 9, 8, 7, 6, 5, 4, 0, 0];
    let mut msg = Message::new("padded", 0, raw).expect("message");
    let mut events = run(0, 7, 1);
    events.extend(run(8, 15, 2));
    msg.construct_tree(&log_of(&events), &StackHashComparator)
        .expect("construct");
    msg.refine(&mut PaddingRefiner::new()).expect("refine");
    let once = spans(msg.tree());
    assert_eq!(once, vec![(0, 3), (4, 7), (8, 13), (14, 15)]);
    msg.refine(&mut PaddingRefiner::new()).expect("refine");
    assert_eq!(spans(msg.tree()), once);
    let padding: Vec<Span> = msg
        .tree()
        .leaves()
        .into_iter()
        .filter(|&id| msg.tree()[id].has_flag(NodeFlags::PADDING))
        .map(|id| msg.tree()[id].span())
        .collect();
    assert_eq!(padding, vec![Span::new(4, 7), Span::new(14, 15)]);
}

#[test]
fn test_text_dump_lists_histories() {
    let raw: Vec<u8> = (0u8..8).collect();
    let mut msg = Message::new("hdr", 0x100, raw).expect("message");
    let log = log_of(&run(0, 3, 0xabc));
    msg.construct_tree(&log, &StackHashComparator).expect("construct");
    msg.update_history(&log);
    let text = text_dump(&msg);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[1],
        " [0,3] [100:4] 00010203  EH:(00000abc), SEH:(00000abc)"
    );
    assert!(lines[2].starts_with(" [4,7] [104:4] 04050607"));
}

#[test]
fn test_sub_messages_links_and_dot() {
    let mut set = MessageSet::new();
    let mut outer = Message::new("outer", 0x1000, vec![0x11; 16]).expect("message");
    outer.insert(Span::new(4, 7)).expect("insert");
    let mut inner = Message::new("inner", 0x8000, vec![0x22; 4]).expect("message");
    inner.set_tag("xor 0x33");
    let outer_id = set.add(outer);
    let inner_id = set.add(inner);

    let anchor = set
        .get(outer_id)
        .expect("outer")
        .find_node_at(0x1004)
        .expect("leaf");
    set.attach_sub_message(outer_id, anchor, inner_id)
        .expect("attach");
    let inner_root = set.get(inner_id).expect("inner").tree().root();
    assert!(matches!(
        set.attach_sub_message(inner_id, inner_root, outer_id),
        Err(MessageSetError::Cycle { .. })
    ));
    set.add_link(
        (outer_id, anchor),
        (inner_id, inner_root),
        "decrypt",
        LinkDirection::Forward,
    )
    .expect("link");
    assert!(set
        .get(outer_id)
        .expect("outer")
        .tree()
        .has_sub_message(set.get(outer_id).expect("outer").tree().root()));

    let dot = dot_string(&set, outer_id).expect("dot");
    assert!(dot.starts_with("digraph outer {"));
    assert!(dot.contains("outer__4_7 [label="));
    assert!(dot.contains("outer__0_15 -> outer__4_7;"));
    assert!(dot.contains("outer__4_7 -> inner_tag;"));
    assert!(dot.contains("label=\"xor 0x33\""));
    assert!(dot.contains("subgraph cluster_inner {"));
    assert!(dot.contains("inner_tag -> inner__0_3;"));
    assert!(dot.contains("outer__4_7 -> inner__0_3[label=\"decrypt\",style=dashed"));
    assert!(dot.contains("dir=forward"));
}

#[test]
fn test_json_snapshot_round_trip() {
    let mut msg = Message::new("snap", 0x40, vec![7; 24]).expect("message");
    let mut events = run(0, 3, 1);
    events.extend(run(10, 15, 2));
    let log = log_of(&events);
    msg.construct_tree(&log, &StackHashComparator).expect("construct");
    msg.update_history(&log);
    let json = TreeSnapshot::capture(&msg).to_json().expect("json");
    let restored = TreeSnapshot::from_json(&json)
        .expect("parse")
        .restore()
        .expect("restore");
    assert_eq!(restored.leaf_spans(), msg.tree().leaf_spans());
    assert_eq!(restored.node_count(), msg.tree().node_count());
}

#[test]
fn test_errors_are_typed() {
    assert!(matches!(
        Message::new("empty", 0, Vec::new()),
        Err(TreeError::EmptyMessage)
    ));
    let mut tree = MsgTree::new(8).expect("tree");
    assert!(matches!(
        tree.insert(Span::new(4, 8)),
        Err(TreeError::OffsetOutOfRange { .. })
    ));
    assert!(matches!(
        tree.insert(Span::new(5, 3)),
        Err(TreeError::EmptyRegion)
    ));
    assert!(matches!(
        tree.find_or_create_node(Region::new(2, 0)),
        Err(TreeError::EmptyRegion)
    ));
}

#[test]
fn test_nested_sub_messages_export_without_cycles() {
    let mut set = MessageSet::new();
    let ids: Vec<_> = ["l0", "l1", "l2"]
        .iter()
        .map(|name| set.add(Message::new(*name, 0, vec![0; 4]).expect("message")))
        .collect();
    for pair in ids.windows(2) {
        let anchor = set.get(pair[0]).expect("parent").tree().root();
        set.attach_sub_message(pair[0], anchor, pair[1])
            .expect("attach");
    }
    for &id in &ids {
        let root = set.get(id).expect("message").tree().root();
        assert!(matches!(
            set.attach_sub_message(id, root, id),
            Err(MessageSetError::Cycle { .. })
        ));
    }
    let l2_root = set.get(ids[2]).expect("l2").tree().root();
    assert!(matches!(
        set.attach_sub_message(ids[2], l2_root, ids[0]),
        Err(MessageSetError::Cycle { .. })
    ));

    let dot = dot_string(&set, ids[0]).expect("dot");
    assert_eq!(dot.matches("subgraph cluster_").count(), 2);
    assert!(dot.contains("l0__0_3 -> l1_tag;"));
    assert!(dot.contains("l1__0_3 -> l2_tag;"));
}
