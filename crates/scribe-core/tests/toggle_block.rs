use scribe_core::{
    Document, Editor, ElementKind, ElementNode, Node, PluginRegistry, Point, Selection, TextTag,
};

fn block_kinds(doc: &Document) -> Vec<ElementKind> {
    doc.children
        .iter()
        .filter_map(|n| match n {
            Node::Element(el) => Some(el.kind),
            Node::Text(_) => None,
        })
        .collect()
}

#[test]
fn toggle_heading_retypes_selected_paragraph() {
    let doc = Document {
        children: vec![Node::paragraph("Hello")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 0], 5),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command(
            "block.toggle",
            Some(serde_json::json!({ "format": "heading-one" })),
        )
        .unwrap();

    let Node::Element(block) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    assert_eq!(block.kind, ElementKind::HeadingOne);
    let Node::Text(t) = &block.children[0] else {
        panic!("expected text leaf");
    };
    assert_eq!(t.text, "Hello");

    // Selection survives an in-place retype untouched.
    assert_eq!(editor.selection().unwrap().focus.path, vec![0, 0]);
    assert_eq!(editor.selection().unwrap().focus.offset, 5);
}

#[test]
fn toggle_same_heading_twice_returns_to_paragraph() {
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("Hello")],
        },
        Some(Selection::collapsed(Point::new(vec![0, 0], 2))),
        PluginRegistry::richtext(),
    );

    let args = serde_json::json!({ "format": "heading-three" });
    editor.run_command("block.toggle", Some(args.clone())).unwrap();
    assert_eq!(block_kinds(editor.doc()), vec![ElementKind::HeadingThree]);

    editor.run_command("block.toggle", Some(args)).unwrap();
    assert_eq!(block_kinds(editor.doc()), vec![ElementKind::Paragraph]);
}

#[test]
fn toggle_quote_and_back() {
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("quoted")],
        },
        Some(Selection::collapsed(Point::new(vec![0, 0], 0))),
        PluginRegistry::richtext(),
    );

    let args = serde_json::json!({ "format": "block-quote" });
    editor.run_command("block.toggle", Some(args.clone())).unwrap();
    assert_eq!(block_kinds(editor.doc()), vec![ElementKind::BlockQuote]);

    editor.run_command("block.toggle", Some(args)).unwrap();
    assert_eq!(block_kinds(editor.doc()), vec![ElementKind::Paragraph]);
}

#[test]
fn toggle_only_affects_blocks_in_selection() {
    let doc = Document {
        children: vec![
            Node::paragraph("a"),
            Node::paragraph("b"),
            Node::paragraph("c"),
        ],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 1),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command(
            "block.toggle",
            Some(serde_json::json!({ "format": "heading-two" })),
        )
        .unwrap();

    assert_eq!(
        block_kinds(editor.doc()),
        vec![
            ElementKind::HeadingTwo,
            ElementKind::HeadingTwo,
            ElementKind::Paragraph,
        ]
    );
}

#[test]
fn mixed_selection_with_active_format_resets_to_paragraph() {
    let doc = Document {
        children: vec![
            Node::text_block(TextTag::HeadingOne, "a"),
            Node::paragraph("b"),
        ],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 1),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    // heading-one is already active somewhere in the selection, so the
    // toggle resets every selected text tag back to paragraph.
    editor
        .run_command(
            "block.toggle",
            Some(serde_json::json!({ "format": "heading-one" })),
        )
        .unwrap();

    assert_eq!(
        block_kinds(editor.doc()),
        vec![ElementKind::Paragraph, ElementKind::Paragraph]
    );
}

#[test]
fn heading_toggle_inside_list_item_only_updates_memory() {
    let item = Node::Element(ElementNode {
        children: vec![Node::text("entry")],
        ..ElementNode::new(ElementKind::ListItem)
    });
    let doc = Document {
        children: vec![Node::list(scribe_core::ListKind::Bulleted, vec![item])],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0, 0], 0));
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor
        .run_command(
            "block.toggle",
            Some(serde_json::json!({ "format": "heading-two" })),
        )
        .unwrap();

    let Node::Element(list) = &editor.doc().children[0] else {
        panic!("expected list container");
    };
    assert_eq!(list.kind, ElementKind::BulletedList);
    let Node::Element(item) = &list.children[0] else {
        panic!("expected list item");
    };
    // Structure unchanged, only the remembered tag moved.
    assert_eq!(item.kind, ElementKind::ListItem);
    assert_eq!(item.heading, Some(TextTag::HeadingTwo));
}

#[test]
fn toggle_without_selection_is_noop() {
    let doc = Document {
        children: vec![Node::paragraph("Hello")],
    };
    let mut editor = Editor::new(doc.clone(), None, PluginRegistry::richtext());

    editor
        .run_command(
            "block.toggle",
            Some(serde_json::json!({ "format": "heading-one" })),
        )
        .unwrap();

    assert_eq!(editor.doc(), &doc);
    assert!(editor.selection().is_none());
}
