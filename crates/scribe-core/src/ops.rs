use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{Marks, Node, Selection};
use crate::kind::{Align, ElementKind, TextTag};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetBlockFormat {
        #[serde(default)]
        path: Path,
        patch: BlockPatch,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
}

/// A partial update to an element's typed attributes. Absent fields are
/// left untouched; the inner `Option` distinguishes set from clear.
/// Applying a patch yields the reverse patch, which is what makes
/// `SetBlockFormat` invertible for undo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ElementKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Option<Align>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<Option<TextTag>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
}

impl BlockPatch {
    pub fn retype(kind: ElementKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn align(align: Option<Align>) -> Self {
        Self {
            align: Some(align),
            ..Self::default()
        }
    }

    pub fn heading(heading: Option<TextTag>) -> Self {
        Self {
            heading: Some(heading),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.align.is_none() && self.heading.is_none() && self.url.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}
