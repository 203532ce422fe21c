use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::core::{
    clamp_to_char_boundary, node_at_path, Document, Editor, ElementNode, MarkKind, Marks, Node,
    Point, Selection,
};
use crate::kind::{Align, ChildPolicy, ElementKind, ListKind, TextTag};
use crate::ops::{BlockPatch, Op, Path, Transaction};

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler:
        std::sync::Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: std::sync::Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: std::sync::Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>,
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document) -> Vec<Op>;
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        let plugins: Vec<Box<dyn EditorPlugin>> = vec![Box::new(CorePlugin)];
        Self::new(plugins).expect("core registry must be valid")
    }

    pub fn richtext() -> Self {
        let plugins: Vec<Box<dyn EditorPlugin>> = vec![
            Box::new(CorePlugin),
            Box::new(BlockPlugin),
            Box::new(ListPlugin),
            Box::new(MarksPlugin),
            Box::new(crate::paste::PastePlugin),
        ];
        Self::new(plugins).expect("richtext registry must be valid")
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), String> {
        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        Ok(())
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    /// Ops from the first pass with anything to say. Later passes see the
    /// repaired tree on the next fixpoint iteration, so paths in one
    /// pass's batch are never invalidated by another's.
    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        for pass in &self.normalize_passes {
            let ops = pass.run(doc);
            if !ops.is_empty() {
                return ops;
            }
        }
        Vec::new()
    }

    pub fn normalize_selection(
        &self,
        doc: &Document,
        selection: Option<&Selection>,
    ) -> Option<Selection> {
        let selection = selection?;

        let fallback = first_text_point(doc).unwrap_or(Point {
            path: vec![0],
            offset: 0,
        });

        let anchor =
            normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
                normalize_point_to_existing_text(doc, &selection.focus)
                    .unwrap_or_else(|| fallback.clone())
            });
        let focus = normalize_point_to_existing_text(doc, &selection.focus)
            .unwrap_or_else(|| anchor.clone());

        Some(Selection { anchor, focus })
    }
}

fn first_text_point(doc: &Document) -> Option<Point> {
    fn walk(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = walk(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
            }
            path.pop();
        }
        None
    }

    walk(&doc.children, &mut Vec::new())
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = first_text_descendant(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
            }
            path.pop();
        }
        None
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        let node = &children[ix];
        match node {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: point.offset.min(t.text.len()),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
        }
    }

    let node = node_at_path(doc, &resolved_path)?;
    match node {
        Node::Text(t) => Some(Point {
            path: resolved_path,
            offset: point.offset.min(t.text.len()),
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
    }
}

/// Whether this element holds inline content directly. A list item normally
/// does, but items produced by deserialization wrap a paragraph instead and
/// are treated as containers for traversal purposes.
fn is_inline_block(el: &ElementNode) -> bool {
    match el.kind.child_policy() {
        ChildPolicy::ListItems => false,
        ChildPolicy::Inline => {
            if el.kind == ElementKind::ListItem {
                !el.children
                    .iter()
                    .any(|n| matches!(n, Node::Element(inner) if !inner.kind.is_inline()))
            } else {
                true
            }
        }
    }
}

struct CorePlugin;

impl EditorPlugin for CorePlugin {
    fn id(&self) -> &'static str {
        "core"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureTextBlocksHaveLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct EnsureTextBlocksHaveLeaf;

impl NormalizePass for EnsureTextBlocksHaveLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_blocks_have_leaf"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if is_inline_block(el) {
                    let has_text = el.children.iter().any(|n| matches!(n, Node::Text(_)));
                    if !has_text {
                        let mut insert_path = path.clone();
                        insert_path.push(0);
                        ops.push(Op::InsertNode {
                            path: insert_path,
                            node: Node::text(""),
                        });
                    }
                } else {
                    walk(&el.children, path, ops);
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if is_inline_block(el) {
                    if el.children.len() >= 2 {
                        let mut ix = el.children.len();
                        while ix > 0 {
                            ix -= 1;
                            let Node::Text(right) = &el.children[ix] else {
                                continue;
                            };

                            let mut start = ix;
                            while start > 0 {
                                let Some(Node::Text(left)) = el.children.get(start - 1) else {
                                    break;
                                };
                                if left.marks != right.marks {
                                    break;
                                }
                                start -= 1;
                            }

                            if start == ix {
                                continue;
                            }

                            let Some(Node::Text(first)) = el.children.get(start) else {
                                continue;
                            };
                            let mut appended = String::new();
                            for node in el.children.iter().take(ix + 1).skip(start + 1) {
                                if let Node::Text(t) = node {
                                    appended.push_str(&t.text);
                                }
                            }

                            if !appended.is_empty() {
                                let mut insert_text_path = path.clone();
                                insert_text_path.push(start);
                                ops.push(Op::InsertText {
                                    path: insert_text_path,
                                    offset: first.text.len(),
                                    text: appended,
                                });
                            }

                            for remove_ix in (start + 1..=ix).rev() {
                                let mut remove_path = path.clone();
                                remove_path.push(remove_ix);
                                ops.push(Op::RemoveNode { path: remove_path });
                            }

                            ix = start;
                        }
                    }
                } else {
                    walk(&el.children, path, ops);
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);

        ops
    }
}

struct BlockPlugin;

impl EditorPlugin for BlockPlugin {
    fn id(&self) -> &'static str {
        "block"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(ClearStaleBlockAttrs)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.toggle", "Toggle block format", |editor, args| {
                let format: ElementKind = parse_arg(args.as_ref(), "format")?;
                toggle_block(editor, format).map_err(CommandError::new)
            })
            .description("Toggle the block format of the selected block(s).")
            .keywords(["block", "heading", "paragraph", "quote", "list", "toggle"])
            .args_example(serde_json::json!({ "format": "heading-one" })),
            CommandSpec::new("block.set_align", "Set block alignment", |editor, args| {
                let align: Align = parse_arg(args.as_ref(), "align")?;
                set_align(editor, align).map_err(CommandError::new)
            })
            .description("Set text alignment for the selected block(s).")
            .keywords(["align", "alignment", "left", "center", "right", "justify"])
            .args_example(serde_json::json!({ "align": "center" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec {
                id: "block.active_tag".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    let tag = active_text_tag(editor);
                    serde_json::to_value(tag)
                        .map_err(|err| QueryError::new(format!("Failed to encode tag: {err}")))
                }),
            },
            QuerySpec {
                id: "block.is_active".to_string(),
                handler: std::sync::Arc::new(|editor, args| {
                    let format: ElementKind = parse_arg(args.as_ref(), "format")
                        .map_err(|e: CommandError| QueryError::new(e.message().to_string()))?;
                    Ok(Value::Bool(block_is_active(editor, format)))
                }),
            },
            QuerySpec {
                id: "block.align".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    let align = active_block_align(editor);
                    serde_json::to_value(align)
                        .map_err(|err| QueryError::new(format!("Failed to encode align: {err}")))
                }),
            },
        ]
    }
}

struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(PruneEmptyListContainers),
            Box::new(RepairListStructure),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "list.active_kind".to_string(),
            handler: std::sync::Arc::new(|editor, _args| {
                let kind = active_list_kind(editor);
                serde_json::to_value(kind)
                    .map_err(|err| QueryError::new(format!("Failed to encode kind: {err}")))
            }),
        }]
    }
}

struct MarksPlugin;

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("marks.toggle", "Toggle mark", |editor, args| {
                let mark: MarkKind = parse_arg(args.as_ref(), "mark")?;
                toggle_mark(editor, mark).map_err(CommandError::new)
            })
            .description("Toggle a boolean mark on the current selection or caret.")
            .keywords(["bold", "italic", "underline", "strikethrough", "code", "mark"])
            .args_example(serde_json::json!({ "mark": "bold" })),
            CommandSpec::new("marks.set_color", "Set text color", |editor, args| {
                let color: String = parse_arg(args.as_ref(), "color")?;
                set_color(editor, Some(color)).map_err(CommandError::new)
            })
            .description("Set the text color mark on the current selection.")
            .keywords(["color", "text color", "foreground"])
            .args_example(serde_json::json!({ "color": "#ff0000" })),
            CommandSpec::new("marks.unset_color", "Unset text color", |editor, _args| {
                set_color(editor, None).map_err(CommandError::new)
            })
            .description("Remove the text color mark from the current selection.")
            .keywords(["color", "text color", "foreground", "reset"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec {
                id: "marks.get_active".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    serde_json::to_value(active_marks(editor))
                        .map_err(|err| QueryError::new(format!("Failed to encode marks: {err}")))
                }),
            },
            QuerySpec {
                id: "marks.is_active".to_string(),
                handler: std::sync::Arc::new(|editor, args| {
                    let mark: MarkKind = parse_arg(args.as_ref(), "mark")
                        .map_err(|e: CommandError| QueryError::new(e.message().to_string()))?;
                    Ok(Value::Bool(active_marks(editor).get(mark)))
                }),
            },
        ]
    }
}

pub(crate) fn parse_arg<T: serde::de::DeserializeOwned>(
    args: Option<&Value>,
    key: &str,
) -> Result<T, CommandError> {
    let value = args
        .and_then(|v| v.get(key))
        .cloned()
        .ok_or_else(|| CommandError::new(format!("Missing args.{key}")))?;
    serde_json::from_value(value)
        .map_err(|err| CommandError::new(format!("Invalid args.{key}: {err}")))
}

// ---------------------------------------------------------------------------
// Normalize passes for list well-formedness and attribute hygiene.
// ---------------------------------------------------------------------------

struct PruneEmptyListContainers;

impl NormalizePass for PruneEmptyListContainers {
    fn id(&self) -> &'static str {
        "list.prune_empty_containers"
    }

    // Scans the whole document, not just recently edited regions, so a list
    // emptied by any toggle sequence is deleted no matter where it sits.
    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut empties: Vec<Path> = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, empties: &mut Vec<Path>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                if el.kind.is_list() && el.children.is_empty() {
                    empties.push(path.clone());
                } else {
                    walk(&el.children, path, empties);
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut empties);

        // Reverse preorder keeps earlier paths valid while later siblings
        // are removed.
        empties
            .into_iter()
            .rev()
            .map(|path| Op::RemoveNode { path })
            .collect()
    }
}

struct RepairListStructure;

impl NormalizePass for RepairListStructure {
    fn id(&self) -> &'static str {
        "list.repair_structure"
    }

    // Containers hold only list items, and list items only live in
    // containers. Emits one repair per run; the normalize loop iterates to
    // a fixpoint.
    fn run(&self, doc: &Document) -> Vec<Op> {
        for (ix, node) in doc.children.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            if el.kind.is_list() {
                for (child_ix, child) in el.children.iter().enumerate() {
                    let is_item =
                        matches!(child, Node::Element(inner) if inner.kind == ElementKind::ListItem);
                    if is_item {
                        continue;
                    }
                    if matches!(child, Node::Text(_)) {
                        // Containers have no business holding bare text.
                        return vec![Op::RemoveNode {
                            path: vec![ix, child_ix],
                        }];
                    }
                    // Lift the stray block out, right after its container.
                    return vec![
                        Op::RemoveNode {
                            path: vec![ix, child_ix],
                        },
                        Op::InsertNode {
                            path: vec![ix + 1],
                            node: child.clone(),
                        },
                    ];
                }
            } else if el.kind == ElementKind::ListItem {
                // An orphaned item reverts to its remembered tag.
                return vec![
                    Op::RemoveNode { path: vec![ix] },
                    Op::InsertNode {
                        path: vec![ix],
                        node: lift_list_item(Node::Element(el.clone())),
                    },
                ];
            }
        }
        Vec::new()
    }
}

struct ClearStaleBlockAttrs;

impl NormalizePass for ClearStaleBlockAttrs {
    fn id(&self) -> &'static str {
        "block.clear_stale_attrs"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);

                let mut patch = BlockPatch::default();
                if el.heading.is_some() && el.kind != ElementKind::ListItem {
                    patch.heading = Some(None);
                }
                let align_is_stale = match el.align {
                    Some(Align::Left) => true,
                    Some(_) => !el.kind.is_alignable(),
                    None => false,
                };
                if align_is_stale {
                    patch.align = Some(None);
                }
                if !patch.is_empty() {
                    ops.push(Op::SetBlockFormat {
                        path: path.clone(),
                        patch,
                    });
                }

                walk(&el.children, path, ops);
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

// ---------------------------------------------------------------------------
// Block toggle engine.
// ---------------------------------------------------------------------------

fn toggle_block(editor: &mut Editor, format: ElementKind) -> Result<(), String> {
    let Some(sel) = editor.selection().cloned() else {
        // Toolbar controls fire without a live selection; nothing to do.
        return Ok(());
    };

    if let Some(kind) = format.as_list_kind() {
        return toggle_list(editor, &sel, kind);
    }
    if let Some(tag) = format.as_text_tag() {
        return toggle_text_tag(editor, &sel, tag);
    }
    Err(format!("Not a toggleable block format: {format:?}"))
}

fn toggle_text_tag(editor: &mut Editor, sel: &Selection, tag: TextTag) -> Result<(), String> {
    let target_kind: ElementKind = tag.into();
    let mut ops: Vec<Op> = Vec::new();

    {
        let doc = editor.doc();
        let (blocks, a, b) = selection_text_blocks(doc, sel)?;

        let is_active = blocks
            .iter()
            .take(b + 1)
            .skip(a)
            .any(|block| block.el.kind == target_kind);

        for block in blocks.iter().take(b + 1).skip(a) {
            let el = block.el;
            let item_path = enclosing_list_item(doc, &block.path)
                .or_else(|| (el.kind == ElementKind::ListItem).then(|| block.path.clone()));

            if let Some(item_path) = item_path {
                // Inside a list the item keeps its structure; a heading
                // toggle only updates what the item remembers being.
                if tag.is_heading() {
                    ops.push(Op::SetBlockFormat {
                        path: item_path,
                        patch: BlockPatch::heading(Some(tag)),
                    });
                }
                continue;
            }

            if el.kind.as_text_tag().is_none() {
                continue;
            }
            let next: ElementKind = if is_active {
                ElementKind::Paragraph
            } else {
                target_kind
            };
            if el.kind != next {
                ops.push(Op::SetBlockFormat {
                    path: block.path.clone(),
                    patch: BlockPatch::retype(next),
                });
            }
        }
    }

    if ops.is_empty() {
        return Ok(());
    }
    editor
        .apply(
            Transaction::new(ops)
                .selection_after(sel.clone())
                .source("command:block.toggle"),
        )
        .map_err(|e| format!("Failed to toggle block: {e}"))
}

fn toggle_list(editor: &mut Editor, sel: &Selection, kind: ListKind) -> Result<(), String> {
    let container_kind: ElementKind = kind.into();
    let t0;
    let t1;
    let new_nodes;

    {
        let doc = editor.doc();
        let (start, end) = ordered_selection_points(sel);
        let start_block = containing_text_block_path(doc, &start.path)
            .ok_or_else(|| "Selection start is not in a text block".to_string())?;
        let end_block = containing_text_block_path(doc, &end.path)
            .ok_or_else(|| "Selection end is not in a text block".to_string())?;

        t0 = start_block[0].min(end_block[0]);
        t1 = start_block[0].max(end_block[0]);
        let first_item = (start_block.len() >= 2).then(|| start_block[1]);
        let last_item = (end_block.len() >= 2).then(|| end_block[1]);

        if t1 >= doc.children.len() {
            return Err("Selection is out of bounds".to_string());
        }
        let segment: Vec<Node> = doc.children[t0..=t1].to_vec();

        let is_active = segment_has_active_container(&segment, container_kind, first_item, last_item);

        new_nodes = if is_active {
            unwrap_list_segment(segment, first_item, last_item)
        } else {
            wrap_list_segment(segment, kind, first_item, last_item)
        };
    }

    let mut ops: Vec<Op> = Vec::new();
    for ix in (t0..=t1).rev() {
        ops.push(Op::RemoveNode { path: vec![ix] });
    }
    for (j, node) in new_nodes.into_iter().enumerate() {
        ops.push(Op::InsertNode {
            path: vec![t0 + j],
            node,
        });
    }

    editor
        .apply(
            Transaction::new(ops)
                .selection_after(sel.clone())
                .source("command:block.toggle"),
        )
        .map_err(|e| format!("Failed to toggle list: {e}"))
}

fn segment_has_active_container(
    segment: &[Node],
    container_kind: ElementKind,
    first_item: Option<usize>,
    last_item: Option<usize>,
) -> bool {
    let last = segment.len().saturating_sub(1);
    segment.iter().enumerate().any(|(ix, node)| {
        let Node::Element(el) = node else {
            return false;
        };
        if el.kind != container_kind || el.children.is_empty() {
            return false;
        }
        let lo = if ix == 0 { first_item.unwrap_or(0) } else { 0 };
        let hi = if ix == last {
            last_item.unwrap_or(el.children.len() - 1)
        } else {
            el.children.len() - 1
        };
        lo <= hi
    })
}

/// Active branch: selected items leave their containers and revert to the
/// tag they remember; unselected items stay wrapped on either side.
fn unwrap_list_segment(
    segment: Vec<Node>,
    first_item: Option<usize>,
    last_item: Option<usize>,
) -> Vec<Node> {
    let last = segment.len().saturating_sub(1);
    let mut out: Vec<Node> = Vec::new();

    for (ix, node) in segment.into_iter().enumerate() {
        match node {
            Node::Element(el) if el.kind.is_list() => {
                let len = el.children.len();
                if len == 0 {
                    continue;
                }
                let lo = if ix == 0 {
                    first_item.unwrap_or(0).min(len - 1)
                } else {
                    0
                };
                let hi = if ix == last {
                    last_item.unwrap_or(len - 1).min(len - 1)
                } else {
                    len - 1
                };

                let kind = el.kind;
                let mut items = el.children;
                let after = items.split_off(hi + 1);
                let selected = items.split_off(lo);
                let before = items;

                if !before.is_empty() {
                    out.push(Node::Element(ElementNode {
                        children: before,
                        ..ElementNode::new(kind)
                    }));
                }
                for item in selected {
                    out.push(lift_list_item(item));
                }
                if !after.is_empty() {
                    out.push(Node::Element(ElementNode {
                        children: after,
                        ..ElementNode::new(kind)
                    }));
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Inactive branch: selected text-tag blocks become list items remembering
/// their tag, items from other containers come along as-is, and every
/// consecutive run of items is wrapped in one new container.
fn wrap_list_segment(
    segment: Vec<Node>,
    kind: ListKind,
    first_item: Option<usize>,
    last_item: Option<usize>,
) -> Vec<Node> {
    let container_kind: ElementKind = kind.into();
    let last = segment.len().saturating_sub(1);
    let mut out: Vec<Node> = Vec::new();
    let mut run: Vec<Node> = Vec::new();

    fn flush(run: &mut Vec<Node>, out: &mut Vec<Node>, container_kind: ElementKind) {
        if run.is_empty() {
            return;
        }
        out.push(Node::Element(ElementNode {
            children: std::mem::take(run),
            ..ElementNode::new(container_kind)
        }));
    }

    for (ix, node) in segment.into_iter().enumerate() {
        match node {
            Node::Element(el) if el.kind.is_list() => {
                let len = el.children.len();
                if len == 0 {
                    continue;
                }
                let lo = if ix == 0 {
                    first_item.unwrap_or(0).min(len - 1)
                } else {
                    0
                };
                let hi = if ix == last {
                    last_item.unwrap_or(len - 1).min(len - 1)
                } else {
                    len - 1
                };

                let orig = el.kind;
                let mut items = el.children;
                let after = items.split_off(hi + 1);
                let selected = items.split_off(lo);
                let before = items;

                if !before.is_empty() {
                    flush(&mut run, &mut out, container_kind);
                    out.push(Node::Element(ElementNode {
                        children: before,
                        ..ElementNode::new(orig)
                    }));
                }
                run.extend(selected);
                if !after.is_empty() {
                    flush(&mut run, &mut out, container_kind);
                    out.push(Node::Element(ElementNode {
                        children: after,
                        ..ElementNode::new(orig)
                    }));
                }
            }
            Node::Element(mut el) if el.kind.is_text_tag() => {
                el.heading = el.kind.as_text_tag();
                el.kind = ElementKind::ListItem;
                run.push(Node::Element(el));
            }
            other => {
                flush(&mut run, &mut out, container_kind);
                out.push(other);
            }
        }
    }
    flush(&mut run, &mut out, container_kind);

    out
}

/// Restore an item leaving its list: structural type becomes the
/// remembered tag (default paragraph) and the memory is cleared.
fn lift_list_item(node: Node) -> Node {
    match node {
        Node::Element(mut el) if el.kind == ElementKind::ListItem => {
            let tag = el.heading.take().unwrap_or(TextTag::Paragraph);
            // Deserialized items wrap a single paragraph; unwrap it so the
            // lifted block holds its inline content directly.
            if el.children.len() == 1
                && matches!(&el.children[0], Node::Element(inner) if inner.kind == ElementKind::Paragraph)
            {
                if let Node::Element(inner) = el.children.remove(0) {
                    if el.align.is_none() {
                        el.align = inner.align;
                    }
                    el.children = inner.children;
                }
            }
            el.kind = tag.into();
            Node::Element(el)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Alignment engine.
// ---------------------------------------------------------------------------

fn set_align(editor: &mut Editor, align: Align) -> Result<(), String> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };

    let mut ops: Vec<Op> = Vec::new();
    {
        let doc = editor.doc();
        let (blocks, a, b) = selection_text_blocks(doc, &sel)?;

        for block in blocks.iter().take(b + 1).skip(a) {
            let el = block.el;
            if !el.kind.is_alignable() {
                continue;
            }

            // Left is the default and is stored as attribute absence.
            if align == Align::Left {
                if el.align.is_some() {
                    ops.push(Op::SetBlockFormat {
                        path: block.path.clone(),
                        patch: BlockPatch::align(None),
                    });
                }
                continue;
            }

            if el.align == Some(align) {
                continue;
            }
            ops.push(Op::SetBlockFormat {
                path: block.path.clone(),
                patch: BlockPatch::align(Some(align)),
            });
        }
    }

    if ops.is_empty() {
        return Ok(());
    }
    editor
        .apply(
            Transaction::new(ops)
                .selection_after(sel.clone())
                .source("command:block.set_align"),
        )
        .map_err(|e| format!("Failed to set alignment: {e}"))
}

// ---------------------------------------------------------------------------
// Mark engine.
// ---------------------------------------------------------------------------

fn toggle_mark(editor: &mut Editor, mark: MarkKind) -> Result<(), String> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };

    if sel.is_collapsed() {
        let (ops, selection_after) = toggle_mark_at_caret(editor, |mut marks| {
            let target = !marks.get(mark);
            marks.set(mark, target);
            marks
        })?;
        return editor
            .apply(
                Transaction::new(ops)
                    .selection_after(selection_after)
                    .source("command:marks.toggle"),
            )
            .map_err(|e| format!("Failed to toggle mark: {e}"));
    }

    // The pending marks at the selection start decide the direction; no
    // full-selection scan.
    let target = !marks_at_selection_start(editor.doc(), &sel).get(mark);
    let (ops, selection_after) = apply_mark_range(editor, &sel, &move |mut marks: Marks| {
        marks.set(mark, target);
        marks
    })?;
    if ops.is_empty() {
        return Ok(());
    }
    editor
        .apply(
            Transaction::new(ops)
                .selection_after(selection_after)
                .source("command:marks.toggle"),
        )
        .map_err(|e| format!("Failed to toggle mark: {e}"))
}

fn set_color(editor: &mut Editor, color: Option<String>) -> Result<(), String> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };

    let source = match color {
        Some(_) => "command:marks.set_color",
        None => "command:marks.unset_color",
    };

    if sel.is_collapsed() {
        let (ops, selection_after) = toggle_mark_at_caret(editor, |mut marks| {
            marks.color = color.clone();
            marks
        })?;
        return editor
            .apply(
                Transaction::new(ops)
                    .selection_after(selection_after)
                    .source(source),
            )
            .map_err(|e| format!("Failed to set color: {e}"));
    }

    let (ops, selection_after) = apply_mark_range(editor, &sel, &move |mut marks: Marks| {
        marks.color = color.clone();
        marks
    })?;
    if ops.is_empty() {
        return Ok(());
    }
    editor
        .apply(
            Transaction::new(ops)
                .selection_after(selection_after)
                .source(source),
        )
        .map_err(|e| format!("Failed to set color: {e}"))
}

fn marks_at_selection_start(doc: &Document, sel: &Selection) -> Marks {
    let (start, _) = ordered_selection_points(sel);
    match node_at_path(doc, &start.path) {
        Some(Node::Text(text)) => text.marks.clone(),
        _ => Marks::default(),
    }
}

fn active_marks(editor: &Editor) -> Marks {
    match editor.selection() {
        Some(sel) => marks_at_selection_start(editor.doc(), sel),
        None => Marks::default(),
    }
}

fn toggle_mark_at_caret(
    editor: &Editor,
    apply: impl Fn(Marks) -> Marks,
) -> Result<(Vec<Op>, Selection), String> {
    let focus = editor
        .selection()
        .ok_or_else(|| "No selection".to_string())?
        .focus
        .clone();
    if focus.path.is_empty() {
        return Err("Selection is not in a text node".into());
    }
    let (child_ix, block_path) = focus
        .path
        .split_last()
        .ok_or_else(|| "Selection is not in a text node".to_string())?;

    let Some(Node::Element(el)) = node_at_path(editor.doc(), block_path) else {
        return Err("Selection is not in a text block".into());
    };
    let Some(Node::Text(text)) = el.children.get(*child_ix) else {
        return Err("Selection is not in a text node".into());
    };

    let cursor = clamp_to_char_boundary(&text.text, focus.offset);
    let marks_before = text.marks.clone();
    let marks_after = apply(marks_before.clone());

    if text.text.is_empty() {
        let selection_after = Selection::collapsed(Point::new(focus.path.clone(), 0));
        return Ok((
            vec![Op::SetTextMarks {
                path: focus.path.clone(),
                marks: marks_after,
            }],
            selection_after,
        ));
    }

    let mut replacement: Vec<Node> = Vec::new();
    let base_child_ix = *child_ix;
    let mut caret_child_ix = base_child_ix;

    let left = text.text.get(..cursor).unwrap_or("").to_string();
    let right = text.text.get(cursor..).unwrap_or("").to_string();

    if !left.is_empty() {
        replacement.push(Node::text_with_marks(left, marks_before.clone()));
        caret_child_ix += 1;
    }

    replacement.push(Node::text_with_marks("", marks_after));

    if !right.is_empty() {
        replacement.push(Node::text_with_marks(right, marks_before));
    }

    let mut ops: Vec<Op> = Vec::new();
    ops.push(Op::RemoveNode {
        path: focus.path.clone(),
    });
    for (i, node) in replacement.into_iter().enumerate() {
        let mut path = block_path.to_vec();
        path.push(base_child_ix + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut caret_path = block_path.to_vec();
    caret_path.push(caret_child_ix);
    let selection_after = Selection::collapsed(Point::new(caret_path, 0));
    Ok((ops, selection_after))
}

fn apply_mark_range(
    editor: &Editor,
    sel: &Selection,
    apply: &dyn Fn(Marks) -> Marks,
) -> Result<(Vec<Op>, Selection), String> {
    let (start, end) = ordered_selection_points(sel);
    let doc = editor.doc();

    let (blocks, start_index, end_index) = selection_text_blocks(doc, sel)?;

    let start_inline_ix = start.path.last().copied().unwrap_or(0);
    let end_inline_ix = end.path.last().copied().unwrap_or(0);

    let mut ops: Vec<Op> = Vec::new();
    let mut new_anchor = sel.anchor.clone();
    let mut new_focus = sel.focus.clone();

    for (block_index, block) in blocks
        .iter()
        .enumerate()
        .take(end_index + 1)
        .skip(start_index)
    {
        let children = block.el.children.as_slice();
        let total_len = total_inline_text_len(children);
        if total_len == 0 {
            continue;
        }

        let start_global = if block_index == start_index {
            point_global_offset(children, start_inline_ix, start.offset)
        } else {
            0
        };
        let end_global = if block_index == end_index {
            point_global_offset(children, end_inline_ix, end.offset)
        } else {
            total_len
        };

        if start_global >= end_global {
            continue;
        }

        let new_children = apply_marks_in_block(children, start_global, end_global, apply);

        for child_ix in (0..children.len()).rev() {
            let mut remove_path = block.path.clone();
            remove_path.push(child_ix);
            ops.push(Op::RemoveNode { path: remove_path });
        }
        for (child_ix, node) in new_children.iter().cloned().enumerate() {
            let mut insert_path = block.path.clone();
            insert_path.push(child_ix);
            ops.push(Op::InsertNode {
                path: insert_path,
                node,
            });
        }

        if is_point_in_block(&new_anchor, &block.path) {
            let global = point_global_offset(
                children,
                new_anchor.path.last().copied().unwrap_or(0),
                new_anchor.offset,
            );
            new_anchor = point_for_global_offset(&block.path, &new_children, global);
        }
        if is_point_in_block(&new_focus, &block.path) {
            let global = point_global_offset(
                children,
                new_focus.path.last().copied().unwrap_or(0),
                new_focus.offset,
            );
            new_focus = point_for_global_offset(&block.path, &new_children, global);
        }
    }

    Ok((
        ops,
        Selection {
            anchor: new_anchor,
            focus: new_focus,
        },
    ))
}

fn apply_marks_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(Marks) -> Marks,
) -> Vec<Node> {
    if start_global >= end_global {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let (node_start, node_end) = match node {
            Node::Text(t) => {
                let start = cursor;
                let end = cursor + t.text.len();
                cursor = end;
                (start, end)
            }
            Node::Element(_) => {
                out.push(node.clone());
                continue;
            }
        };

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };

        let sel_start = (start_global.saturating_sub(node_start)).min(t.text.len());
        let sel_end = (end_global.saturating_sub(node_start)).min(t.text.len());

        let sel_start = clamp_to_char_boundary(&t.text, sel_start);
        let sel_end = clamp_to_char_boundary(&t.text, sel_end);

        if sel_start == 0 && sel_end == t.text.len() {
            let mut next = t.clone();
            next.marks = apply(next.marks);
            out.push(Node::Text(next));
            continue;
        }

        let prefix = t.text.get(..sel_start).unwrap_or("").to_string();
        let middle = t.text.get(sel_start..sel_end).unwrap_or("").to_string();
        let suffix = t.text.get(sel_end..).unwrap_or("").to_string();

        if !prefix.is_empty() {
            out.push(Node::text_with_marks(prefix, t.marks.clone()));
        }
        if !middle.is_empty() {
            out.push(Node::text_with_marks(middle, apply(t.marks.clone())));
        }
        if !suffix.is_empty() {
            out.push(Node::text_with_marks(suffix, t.marks.clone()));
        }
    }

    if out.is_empty() {
        out.push(Node::text(""));
    }

    out
}

// ---------------------------------------------------------------------------
// Shared traversal helpers.
// ---------------------------------------------------------------------------

struct TextBlock<'a> {
    path: Path,
    el: &'a ElementNode,
}

fn text_blocks_in_order(doc: &Document) -> Vec<TextBlock<'_>> {
    fn walk<'a>(nodes: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<TextBlock<'a>>) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            path.push(ix);

            if el.kind.is_text_block() && is_inline_block(el) {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else if !el.kind.is_inline() {
                walk(&el.children, path, out);
            }

            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

fn selection_text_blocks<'a>(
    doc: &'a Document,
    sel: &Selection,
) -> Result<(Vec<TextBlock<'a>>, usize, usize), String> {
    let (start, end) = ordered_selection_points(sel);
    let start_block_path = containing_text_block_path(doc, &start.path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_block_path = containing_text_block_path(doc, &end.path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let blocks = text_blocks_in_order(doc);
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let (a, b) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };
    Ok((blocks, a, b))
}

fn containing_text_block_path(doc: &Document, path: &[usize]) -> Option<Path> {
    for len in (1..=path.len()).rev() {
        if let Some(Node::Element(el)) = node_at_path(doc, &path[..len]) {
            if el.kind.is_text_block() && is_inline_block(el) {
                return Some(path[..len].to_vec());
            }
        }
    }
    None
}

fn enclosing_list_item(doc: &Document, block_path: &[usize]) -> Option<Path> {
    if block_path.len() < 2 {
        return None;
    }
    let parent = &block_path[..block_path.len() - 1];
    match node_at_path(doc, parent) {
        Some(Node::Element(el)) if el.kind == ElementKind::ListItem => Some(parent.to_vec()),
        _ => None,
    }
}

fn enclosing_list_container(doc: &Document, block_path: &[usize]) -> Option<ElementKind> {
    for len in (1..block_path.len()).rev() {
        if let Some(Node::Element(el)) = node_at_path(doc, &block_path[..len]) {
            if el.kind.is_list() {
                return Some(el.kind);
            }
        }
    }
    None
}

fn ordered_selection_points(sel: &Selection) -> (Point, Point) {
    let mut start = sel.anchor.clone();
    let mut end = sel.focus.clone();

    if start.path == end.path {
        if end.offset < start.offset {
            std::mem::swap(&mut start, &mut end);
        }
        return (start, end);
    }
    if end.path < start.path {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

fn total_inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.len(),
            Node::Element(_) => 0,
        })
        .sum()
}

fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if ix < child_ix {
                    global += t.text.len();
                    continue;
                }
                if ix == child_ix {
                    global += clamp_to_char_boundary(&t.text, offset);
                }
                break;
            }
            Node::Element(_) => {}
        }
    }
    global
}

fn point_for_global_offset(block_path: &[usize], children: &[Node], global_offset: usize) -> Point {
    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if remaining < t.text.len() {
                    let mut path = block_path.to_vec();
                    path.push(child_ix);
                    return Point::new(path, clamp_to_char_boundary(&t.text, remaining));
                }
                if remaining == t.text.len() {
                    if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                        let mut path = block_path.to_vec();
                        path.push(child_ix + 1);
                        return Point::new(path, 0);
                    }
                    let mut path = block_path.to_vec();
                    path.push(child_ix);
                    return Point::new(path, t.text.len());
                }
                remaining = remaining.saturating_sub(t.text.len());
            }
            Node::Element(_) => {}
        }
    }

    // Fallback to end of last text node.
    for (child_ix, node) in children.iter().enumerate().rev() {
        if let Node::Text(t) = node {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
    }

    let mut path = block_path.to_vec();
    path.push(0);
    Point::new(path, 0)
}

fn is_point_in_block(point: &Point, block_path: &[usize]) -> bool {
    point.path.len() == block_path.len() + 1 && point.path.starts_with(block_path)
}

// ---------------------------------------------------------------------------
// Query helpers.
// ---------------------------------------------------------------------------

fn focus_text_block_path(editor: &Editor) -> Option<Path> {
    let focus = &editor.selection()?.focus;
    containing_text_block_path(editor.doc(), &focus.path)
}

fn active_text_tag(editor: &Editor) -> Option<TextTag> {
    let block_path = focus_text_block_path(editor)?;
    let doc = editor.doc();

    let item_path = enclosing_list_item(doc, &block_path).or_else(|| {
        matches!(node_at_path(doc, &block_path), Some(Node::Element(el)) if el.kind == ElementKind::ListItem)
            .then(|| block_path.clone())
    });
    if let Some(item_path) = item_path {
        let Some(Node::Element(item)) = node_at_path(doc, &item_path) else {
            return None;
        };
        return Some(item.heading.unwrap_or(TextTag::Paragraph));
    }

    let Some(Node::Element(el)) = node_at_path(doc, &block_path) else {
        return None;
    };
    el.kind.as_text_tag()
}

fn active_list_kind(editor: &Editor) -> Option<ListKind> {
    let block_path = focus_text_block_path(editor)?;
    enclosing_list_container(editor.doc(), &block_path).and_then(|k| k.as_list_kind())
}

fn active_block_align(editor: &Editor) -> Option<Align> {
    let block_path = focus_text_block_path(editor)?;
    let Some(Node::Element(el)) = node_at_path(editor.doc(), &block_path) else {
        return None;
    };
    el.align
}

fn block_is_active(editor: &Editor, format: ElementKind) -> bool {
    let Some(block_path) = focus_text_block_path(editor) else {
        return false;
    };
    let doc = editor.doc();

    if format.is_list() {
        return enclosing_list_container(doc, &block_path) == Some(format);
    }

    let Some(Node::Element(el)) = node_at_path(doc, &block_path) else {
        return false;
    };
    if el.kind == format {
        return true;
    }
    // Headings remembered by a list item count as active.
    if format.is_heading() {
        let item_path = enclosing_list_item(doc, &block_path).or_else(|| {
            (el.kind == ElementKind::ListItem).then(|| block_path.clone())
        });
        if let Some(item_path) = item_path {
            if let Some(Node::Element(item)) = node_at_path(doc, &item_path) {
                return item.heading.map(ElementKind::from) == Some(format);
            }
        }
    }
    false
}
