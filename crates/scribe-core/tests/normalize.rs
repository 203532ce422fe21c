use scribe_core::{
    Align, Document, Editor, ElementKind, ElementNode, ListKind, Node, PluginRegistry, Point,
    Selection, TextTag,
};

fn richtext_editor(doc: Document) -> Editor {
    Editor::new(
        doc,
        Some(Selection::collapsed(Point::new(vec![0, 0], 0))),
        PluginRegistry::richtext(),
    )
}

#[test]
fn empty_document_gains_a_paragraph() {
    let editor = richtext_editor(Document { children: vec![] });
    assert_eq!(editor.doc().children.len(), 1);
    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    assert_eq!(el.kind, ElementKind::Paragraph);
}

#[test]
fn empty_list_containers_are_pruned_on_load() {
    let doc = Document {
        children: vec![
            Node::paragraph("keep"),
            Node::list(ListKind::Bulleted, vec![]),
            Node::list(ListKind::Numbered, vec![]),
        ],
    };
    let editor = richtext_editor(doc);

    assert_eq!(editor.doc().children.len(), 1);
}

#[test]
fn orphaned_list_item_reverts_to_remembered_tag() {
    let orphan = Node::Element(ElementNode {
        heading: Some(TextTag::HeadingTwo),
        children: vec![Node::text("stray")],
        ..ElementNode::new(ElementKind::ListItem)
    });
    let editor = richtext_editor(Document {
        children: vec![orphan],
    });

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    assert_eq!(el.kind, ElementKind::HeadingTwo);
    assert_eq!(el.heading, None);
}

#[test]
fn orphaned_item_without_memory_becomes_paragraph() {
    let orphan = Node::Element(ElementNode {
        children: vec![Node::text("stray")],
        ..ElementNode::new(ElementKind::ListItem)
    });
    let editor = richtext_editor(Document {
        children: vec![orphan],
    });

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    assert_eq!(el.kind, ElementKind::Paragraph);
}

#[test]
fn stray_block_inside_container_is_lifted_out() {
    let doc = Document {
        children: vec![Node::list(
            ListKind::Bulleted,
            vec![
                Node::Element(ElementNode {
                    children: vec![Node::text("a")],
                    ..ElementNode::new(ElementKind::ListItem)
                }),
                Node::paragraph("stray"),
                Node::Element(ElementNode {
                    children: vec![Node::text("b")],
                    ..ElementNode::new(ElementKind::ListItem)
                }),
            ],
        )],
    };
    let editor = richtext_editor(doc);

    let doc = editor.doc();
    assert_eq!(doc.children.len(), 2);
    let Node::Element(list) = &doc.children[0] else {
        panic!("expected list container");
    };
    assert_eq!(list.kind, ElementKind::BulletedList);
    assert_eq!(list.children.len(), 2);
    let Node::Element(lifted) = &doc.children[1] else {
        panic!("expected element");
    };
    assert_eq!(lifted.kind, ElementKind::Paragraph);
}

#[test]
fn stale_attrs_are_cleared() {
    let doc = Document {
        children: vec![
            // Heading memory on a paragraph is meaningless.
            Node::Element(ElementNode {
                heading: Some(TextTag::HeadingOne),
                children: vec![Node::text("a")],
                ..ElementNode::new(ElementKind::Paragraph)
            }),
            // Explicit left alignment is the default and is dropped.
            Node::Element(ElementNode {
                align: Some(Align::Left),
                children: vec![Node::text("b")],
                ..ElementNode::new(ElementKind::Paragraph)
            }),
        ],
    };
    let editor = richtext_editor(doc);

    for child in &editor.doc().children {
        let Node::Element(el) = child else {
            panic!("expected element");
        };
        assert_eq!(el.heading, None);
        assert_eq!(el.align, None);
    }
}

#[test]
fn text_blocks_get_an_empty_leaf() {
    let doc = Document {
        children: vec![Node::Element(ElementNode::new(ElementKind::Paragraph))],
    };
    let editor = richtext_editor(doc);

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    assert!(matches!(el.children.as_slice(), [Node::Text(t)] if t.text.is_empty()));
}

#[test]
fn adjacent_leaves_with_equal_marks_merge() {
    let doc = Document {
        children: vec![Node::Element(ElementNode {
            children: vec![Node::text("ab"), Node::text("cd"), Node::text("ef")],
            ..ElementNode::new(ElementKind::Paragraph)
        })],
    };
    let editor = richtext_editor(doc);

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected element");
    };
    assert_eq!(el.children.len(), 1);
    let Node::Text(t) = &el.children[0] else {
        panic!("expected text leaf");
    };
    assert_eq!(t.text, "abcdef");
}

#[test]
fn serde_round_trip_preserves_the_tree() {
    let doc = Document {
        children: vec![
            Node::text_block(TextTag::HeadingOne, "Title"),
            Node::list(
                ListKind::Numbered,
                vec![Node::Element(ElementNode {
                    heading: Some(TextTag::Paragraph),
                    children: vec![Node::text("item")],
                    ..ElementNode::new(ElementKind::ListItem)
                })],
            ),
        ],
    };

    let value = scribe_core::DocValue::from_document(doc.clone());
    let json = value.to_json_pretty().unwrap();
    assert!(json.contains("\"heading-one\""));
    assert!(json.contains("\"numbered-list\""));

    let back = scribe_core::DocValue::from_json_str(&json).unwrap();
    assert_eq!(back.into_document(), doc);
}
