//! Export message trees: indented text dump and Graphviz DOT.
//!
//! DOT nodes are named `<message>__<l>_<r>`, so links, sub-message anchors and containment
//! edges can be matched up by external renderers. Message names are used as-is when they
//! are plain identifiers; any other character becomes `_`.

use crate::history;
use crate::message::{Message, MessageId, MessageSet};
use crate::node::{NodeFlags, NodeId, TreeNode};
use std::io::{self, Write};

/// Max label characters of byte content for leaves and inner nodes.
const LEAF_BYTES_CHARS: usize = 36;
const INNER_BYTES_CHARS: usize = 24;

/// Compact hex for labels, cut to `max_chars` with a trailing `..`.
pub fn bytes_to_label(b: &[u8], max_chars: usize) -> String {
    let full: String = b.iter().map(|x| format!("{:02x}", x)).collect();
    if full.len() <= max_chars {
        full
    } else {
        let keep = max_chars.saturating_sub(2) & !1;
        format!("{}..", &full[..keep])
    }
}

/// Exporters slice `msg.raw()` by node ranges; the tree must cover exactly those bytes.
fn check_sizes(msg: &Message) -> io::Result<()> {
    if msg.tree().size() != msg.size() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "tree of {} covers {} bytes, message has {}",
                msg.name(),
                msg.tree().size(),
                msg.size()
            ),
        ));
    }
    Ok(())
}

fn dot_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Stable DOT name of `node` in `msg`.
pub fn dot_name(msg: &Message, node: &TreeNode) -> String {
    format!("{}__{}_{}", dot_ident(msg.name()), node.l(), node.r())
}

fn node_label(msg: &Message, id: NodeId, node: &TreeNode) -> String {
    let prefix = if id == msg.tree().root() {
        format!("Root {}", msg.name())
    } else {
        String::new()
    };
    let max = if node.is_leaf() {
        LEAF_BYTES_CHARS
    } else {
        INNER_BYTES_CHARS
    };
    format!(
        "{}[{:x}:{}]\\n{}",
        prefix,
        msg.base() as usize + node.l(),
        node.len(),
        bytes_to_label(&msg.raw()[node.l()..=node.r()], max)
    )
}

fn node_style(node: &TreeNode) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if node.is_leaf() {
        if node.has_flag(NodeFlags::PARALLEL) {
            parts.push("color=blue");
        } else if node.has_flag(NodeFlags::SEPARATOR) {
            parts.push("color=darkgreen");
        } else if node.has_flag(NodeFlags::PADDING) {
            parts.push("color=gray");
        }
    } else {
        parts.push("shape=box");
        if node.has_flag(NodeFlags::PARALLEL) {
            parts.push("color=blue,style=bold");
        }
    }
    parts.join(",")
}

/// Indented listing of every node with its range, bytes and execution histories.
pub fn write_text(msg: &Message, w: &mut dyn Write) -> io::Result<()> {
    check_sizes(msg)?;
    let tree = msg.tree();
    let mut stack = vec![(tree.root(), 0usize)];
    while let Some((id, level)) = stack.pop() {
        let node = &tree[id];
        let bytes = &msg.raw()[node.l()..=node.r()];
        let max = if node.is_leaf() {
            LEAF_BYTES_CHARS
        } else {
            INNER_BYTES_CHARS
        };
        writeln!(
            w,
            "{}[{},{}] [{:x}:{}] {}  EH:({}), SEH:({})",
            " ".repeat(level),
            node.l(),
            node.r(),
            msg.base() as usize + node.l(),
            node.len(),
            bytes_to_label(bytes, max),
            history::encode(node.exec_history()),
            history::encode(node.exec_history_strict()),
        )?;
        for &c in node.children().iter().rev() {
            stack.push((c, level + 1));
        }
    }
    Ok(())
}

pub fn text_dump(msg: &Message) -> String {
    let mut out = Vec::new();
    // a Vec never fails; a size mismatch is refused before anything is written
    let _ = write_text(msg, &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// Write `id` as a DOT graph (`is_root`) or as a cluster subgraph of an enclosing graph.
pub fn write_dot(
    set: &MessageSet,
    id: MessageId,
    w: &mut dyn Write,
    is_root: bool,
) -> io::Result<()> {
    let Some(msg) = set.get(id) else {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("unknown message {}", id),
        ));
    };
    check_sizes(msg)?;
    let name = dot_ident(msg.name());
    if is_root {
        writeln!(w, "digraph {} {{", name)?;
        writeln!(w, "node [shape=box,fontname=\"Consolas\", fontsize=14];")?;
    } else {
        writeln!(w, "subgraph cluster_{} {{", name)?;
    }
    write_dot_node(set, msg, msg.tree().root(), w)?;
    writeln!(w, "}}")
}

fn write_dot_node(
    set: &MessageSet,
    msg: &Message,
    id: NodeId,
    w: &mut dyn Write,
) -> io::Result<()> {
    let tree = msg.tree();
    let node = &tree[id];
    let name = dot_name(msg, node);
    let style = node_style(node);
    if style.is_empty() {
        writeln!(w, "{} [label=\"{}\"];", name, node_label(msg, id, node))?;
    } else {
        writeln!(w, "{} [label=\"{}\",{}];", name, node_label(msg, id, node), style)?;
    }

    if !node.is_leaf() {
        let chain: Vec<String> = node
            .children()
            .iter()
            .map(|&c| dot_name(msg, &tree[c]))
            .collect();
        writeln!(w, "{{ rank = same; rankdir=LR; {}[color=gray];}}", chain.join("->"))?;
        for &c in node.children() {
            write_dot_node(set, msg, c, w)?;
            writeln!(w, "{} -> {};", name, dot_name(msg, &tree[c]))?;
        }
    }

    for &sub_id in node.sub_messages() {
        let Some(sub) = set.get(sub_id) else { continue };
        let tag_name = format!("{}_tag", dot_ident(sub.name()));
        writeln!(
            w,
            "{} [shape=box,color=blueviolet,style=filled,fontcolor=white,label=\"{}\"];",
            tag_name,
            dot_escape(sub.tag().unwrap_or(sub.name()))
        )?;
        writeln!(w, "{} -> {};", name, tag_name)?;
        write_dot(set, sub_id, w, false)?;
        let sub_root = &sub.tree()[sub.tree().root()];
        writeln!(w, "{} -> {};", tag_name, dot_name(sub, sub_root))?;
    }

    for link in node.links() {
        let Some(target_msg) = set.get(link.target_message) else { continue };
        let Some(target) = target_msg.tree().node(link.target) else { continue };
        writeln!(
            w,
            "{} -> {}[label=\"{}\",style=dashed,color=red,fontcolor=red,dir={},penwidth=2.0,decorate=true,constraint=false];",
            name,
            dot_name(target_msg, target),
            dot_escape(&link.description),
            link.direction.as_dot_str()
        )?;
    }
    Ok(())
}

pub fn dot_string(set: &MessageSet, id: MessageId) -> io::Result<String> {
    let mut out = Vec::new();
    write_dot(set, id, &mut out, true)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
