use scribe_core::{Document, Editor, Marks, Node, PluginRegistry, Point, Selection};

fn leaf_texts(doc: &Document) -> Vec<(String, Marks)> {
    let Node::Element(block) = &doc.children[0] else {
        panic!("expected element");
    };
    block
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Text(t) => Some((t.text.clone(), t.marks.clone())),
            Node::Element(_) => None,
        })
        .collect()
}

#[test]
fn toggle_bold_only_affects_selection_range() {
    let doc = Document {
        children: vec![Node::paragraph("abcde")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 1),
        focus: Point::new(vec![0, 0], 3),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command("marks.toggle", Some(serde_json::json!({ "mark": "bold" })))
        .unwrap();

    let texts: Vec<_> = leaf_texts(editor.doc())
        .into_iter()
        .map(|(text, marks)| (text, marks.bold))
        .collect();
    assert_eq!(
        texts,
        vec![
            ("a".to_string(), false),
            ("bc".to_string(), true),
            ("de".to_string(), false),
        ]
    );

    // Same selection again: symmetry restores one unmarked leaf.
    editor
        .run_command("marks.toggle", Some(serde_json::json!({ "mark": "bold" })))
        .unwrap();

    let texts = leaf_texts(editor.doc());
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "abcde");
    assert!(!texts[0].1.bold);
}

#[test]
fn toggle_bold_covering_whole_leaf() {
    let doc = Document {
        children: vec![Node::paragraph("Hello")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 0], 5),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command("marks.toggle", Some(serde_json::json!({ "mark": "bold" })))
        .unwrap();

    let texts = leaf_texts(editor.doc());
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "Hello");
    assert!(texts[0].1.bold);
}

#[test]
fn direction_is_decided_by_marks_at_selection_start() {
    let doc = Document {
        children: vec![Node::Element(scribe_core::ElementNode {
            children: vec![
                Node::text_with_marks(
                    "ab",
                    Marks {
                        bold: true,
                        ..Marks::default()
                    },
                ),
                Node::text("cd"),
            ],
            ..scribe_core::ElementNode::new(scribe_core::ElementKind::Paragraph)
        })],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 1], 2),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    // Start of the selection is bold, so the toggle removes bold across
    // the range even though part of it is unmarked.
    editor
        .run_command("marks.toggle", Some(serde_json::json!({ "mark": "bold" })))
        .unwrap();

    let texts = leaf_texts(editor.doc());
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "abcd");
    assert!(!texts[0].1.bold);
}

#[test]
fn collapsed_caret_sets_pending_marks() {
    let doc = Document {
        children: vec![Node::paragraph("abcd")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 2));
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command("marks.toggle", Some(serde_json::json!({ "mark": "italic" })))
        .unwrap();

    let texts = leaf_texts(editor.doc());
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0].0, "ab");
    assert_eq!(texts[1].0, "");
    assert!(texts[1].1.italic);
    assert_eq!(texts[2].0, "cd");

    // The caret sits on the pending leaf and reports its marks.
    let active: Marks = editor.run_query("marks.get_active", None).unwrap();
    assert!(active.italic);
}

#[test]
fn set_color_splits_at_selection_boundaries() {
    let doc = Document {
        children: vec![Node::paragraph("abcde")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 1),
        focus: Point::new(vec![0, 0], 3),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command(
            "marks.set_color",
            Some(serde_json::json!({ "color": "#ff0000" })),
        )
        .unwrap();

    let texts = leaf_texts(editor.doc());
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[1].0, "bc");
    assert_eq!(texts[1].1.color.as_deref(), Some("#ff0000"));
    assert_eq!(texts[0].1.color, None);
    assert_eq!(texts[2].1.color, None);

    editor.run_command("marks.unset_color", None).unwrap();
    let texts = leaf_texts(editor.doc());
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "abcde");
    assert_eq!(texts[0].1.color, None);
}

#[test]
fn marks_apply_across_blocks() {
    let doc = Document {
        children: vec![Node::paragraph("one"), Node::paragraph("two")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 1),
        focus: Point::new(vec![1, 0], 2),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command("marks.toggle", Some(serde_json::json!({ "mark": "bold" })))
        .unwrap();

    let Node::Element(first) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    let bolds: Vec<_> = first
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Text(t) => Some((t.text.as_str(), t.marks.bold)),
            _ => None,
        })
        .collect();
    assert_eq!(bolds, vec![("o", false), ("ne", true)]);

    let Node::Element(second) = &editor.doc().children[1] else {
        panic!("expected element");
    };
    let bolds: Vec<_> = second
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Text(t) => Some((t.text.as_str(), t.marks.bold)),
            _ => None,
        })
        .collect();
    assert_eq!(bolds, vec![("tw", true), ("o", false)]);
}

#[test]
fn mark_toggle_without_selection_is_noop() {
    let doc = Document {
        children: vec![Node::paragraph("Hello")],
    };
    let mut editor = Editor::new(doc.clone(), None, PluginRegistry::richtext());

    editor
        .run_command("marks.toggle", Some(serde_json::json!({ "mark": "bold" })))
        .unwrap();
    editor
        .run_command(
            "marks.set_color",
            Some(serde_json::json!({ "color": "#00ff00" })),
        )
        .unwrap();

    assert_eq!(editor.doc(), &doc);
}
