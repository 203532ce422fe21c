use scribe_core::{
    Document, Editor, ElementKind, ElementNode, ListKind, Node, PluginRegistry, Point, Selection,
    TextTag,
};

fn bulleted_args() -> serde_json::Value {
    serde_json::json!({ "format": "bulleted-list" })
}

fn numbered_args() -> serde_json::Value {
    serde_json::json!({ "format": "numbered-list" })
}

fn count_empty_lists(doc: &Document) -> usize {
    fn walk(children: &[Node], count: &mut usize) {
        for node in children {
            let Node::Element(el) = node else { continue };
            if el.kind.is_list() && el.children.is_empty() {
                *count += 1;
            }
            walk(&el.children, count);
        }
    }
    let mut count = 0;
    walk(&doc.children, &mut count);
    count
}

fn item(text: &str, heading: Option<TextTag>) -> Node {
    Node::Element(ElementNode {
        heading,
        children: vec![Node::text(text)],
        ..ElementNode::new(ElementKind::ListItem)
    })
}

#[test]
fn wrap_paragraphs_into_bulleted_list() {
    let doc = Document {
        children: vec![Node::paragraph("a"), Node::paragraph("b")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 1),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor.run_command("block.toggle", Some(bulleted_args())).unwrap();

    let doc = editor.doc();
    assert_eq!(doc.children.len(), 1);
    let Node::Element(list) = &doc.children[0] else {
        panic!("expected list container");
    };
    assert_eq!(list.kind, ElementKind::BulletedList);
    assert_eq!(list.children.len(), 2);
    for child in &list.children {
        let Node::Element(item) = child else {
            panic!("expected list item");
        };
        assert_eq!(item.kind, ElementKind::ListItem);
        assert_eq!(item.heading, Some(TextTag::Paragraph));
    }
}

#[test]
fn wrap_then_unwrap_restores_paragraphs() {
    let doc = Document {
        children: vec![Node::paragraph("a"), Node::paragraph("b")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 1),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor.run_command("block.toggle", Some(bulleted_args())).unwrap();

    // Re-select both items inside the new container before toggling back.
    editor.set_selection(Some(Selection {
        anchor: Point::new(vec![0, 0, 0], 0),
        focus: Point::new(vec![0, 1, 0], 1),
    }));
    editor.run_command("block.toggle", Some(bulleted_args())).unwrap();

    let doc = editor.doc();
    assert_eq!(doc.children.len(), 2);
    for (child, text) in doc.children.iter().zip(["a", "b"]) {
        let Node::Element(el) = child else {
            panic!("expected element");
        };
        assert_eq!(el.kind, ElementKind::Paragraph);
        assert_eq!(el.heading, None);
        let Node::Text(t) = &el.children[0] else {
            panic!("expected text leaf");
        };
        assert_eq!(t.text, text);
    }
    assert_eq!(count_empty_lists(doc), 0);
}

#[test]
fn heading_survives_list_round_trip() {
    let doc = Document {
        children: vec![Node::text_block(TextTag::HeadingTwo, "Title")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor.run_command("block.toggle", Some(numbered_args())).unwrap();

    let Node::Element(list) = &editor.doc().children[0] else {
        panic!("expected list container");
    };
    assert_eq!(list.kind, ElementKind::NumberedList);
    let Node::Element(wrapped) = &list.children[0] else {
        panic!("expected list item");
    };
    assert_eq!(wrapped.kind, ElementKind::ListItem);
    assert_eq!(wrapped.heading, Some(TextTag::HeadingTwo));

    editor.set_selection(Some(Selection::collapsed(Point::new(vec![0, 0, 0], 0))));
    editor.run_command("block.toggle", Some(numbered_args())).unwrap();

    let doc = editor.doc();
    assert_eq!(doc.children.len(), 1);
    let Node::Element(restored) = &doc.children[0] else {
        panic!("expected element");
    };
    // Not a paragraph: the item remembered being a heading.
    assert_eq!(restored.kind, ElementKind::HeadingTwo);
    assert_eq!(restored.heading, None);
    assert_eq!(count_empty_lists(doc), 0);
}

#[test]
fn unwrapping_middle_item_splits_container() {
    let doc = Document {
        children: vec![Node::list(
            ListKind::Bulleted,
            vec![item("a", None), item("b", None), item("c", None)],
        )],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 1, 0], 0));
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor.run_command("block.toggle", Some(bulleted_args())).unwrap();

    let doc = editor.doc();
    assert_eq!(doc.children.len(), 3);

    let Node::Element(before) = &doc.children[0] else {
        panic!("expected element");
    };
    assert_eq!(before.kind, ElementKind::BulletedList);
    assert_eq!(before.children.len(), 1);

    let Node::Element(middle) = &doc.children[1] else {
        panic!("expected element");
    };
    assert_eq!(middle.kind, ElementKind::Paragraph);
    let Node::Text(t) = &middle.children[0] else {
        panic!("expected text leaf");
    };
    assert_eq!(t.text, "b");

    let Node::Element(after) = &doc.children[2] else {
        panic!("expected element");
    };
    assert_eq!(after.kind, ElementKind::BulletedList);
    assert_eq!(after.children.len(), 1);

    assert_eq!(count_empty_lists(doc), 0);
}

#[test]
fn toggling_other_list_kind_switches_container() {
    let doc = Document {
        children: vec![Node::list(
            ListKind::Bulleted,
            vec![
                item("a", Some(TextTag::Paragraph)),
                item("b", Some(TextTag::HeadingOne)),
            ],
        )],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0, 0], 0),
        focus: Point::new(vec![0, 1, 0], 1),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor.run_command("block.toggle", Some(numbered_args())).unwrap();

    let doc = editor.doc();
    assert_eq!(doc.children.len(), 1);
    let Node::Element(list) = &doc.children[0] else {
        panic!("expected list container");
    };
    assert_eq!(list.kind, ElementKind::NumberedList);
    assert_eq!(list.children.len(), 2);

    // Items switch container without losing their memory.
    let Node::Element(second) = &list.children[1] else {
        panic!("expected list item");
    };
    assert_eq!(second.heading, Some(TextTag::HeadingOne));
    assert_eq!(count_empty_lists(doc), 0);
}

#[test]
fn wrapping_mixed_tags_remembers_each_origin() {
    let doc = Document {
        children: vec![
            Node::paragraph("a"),
            Node::text_block(TextTag::HeadingThree, "b"),
        ],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 1),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor.run_command("block.toggle", Some(bulleted_args())).unwrap();

    let Node::Element(list) = &editor.doc().children[0] else {
        panic!("expected list container");
    };
    let headings: Vec<_> = list
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Element(el) => Some(el.heading),
            Node::Text(_) => None,
        })
        .collect();
    assert_eq!(
        headings,
        vec![Some(TextTag::Paragraph), Some(TextTag::HeadingThree)]
    );
}

#[test]
fn no_empty_containers_after_toggle_sequences() {
    let doc = Document {
        children: vec![
            Node::paragraph("a"),
            Node::paragraph("b"),
            Node::paragraph("c"),
        ],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![2, 0], 1),
    };
    let mut editor = Editor::new(doc, Some(selection), PluginRegistry::richtext());

    editor.run_command("block.toggle", Some(bulleted_args())).unwrap();
    assert_eq!(count_empty_lists(editor.doc()), 0);

    // Pull the middle item out, then the rest, switching kinds on the way.
    editor.set_selection(Some(Selection::collapsed(Point::new(vec![0, 1, 0], 0))));
    editor.run_command("block.toggle", Some(bulleted_args())).unwrap();
    assert_eq!(count_empty_lists(editor.doc()), 0);

    editor.set_selection(Some(Selection::collapsed(Point::new(vec![0, 0, 0], 0))));
    editor.run_command("block.toggle", Some(numbered_args())).unwrap();
    assert_eq!(count_empty_lists(editor.doc()), 0);

    editor.set_selection(Some(Selection::collapsed(Point::new(vec![0, 0, 0], 0))));
    editor.run_command("block.toggle", Some(numbered_args())).unwrap();
    assert_eq!(count_empty_lists(editor.doc()), 0);
}
