use serde::{Deserialize, Serialize};

/// Every element kind the document model knows about.
///
/// Adding a variant here is a compile-time event: the classifier methods
/// below and the render/normalize dispatch sites all match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    HeadingThree,
    HeadingFour,
    HeadingFive,
    HeadingSix,
    BlockQuote,
    BulletedList,
    NumberedList,
    ListItem,
    Link,
    Image,
}

/// The block kinds that can stand alone as a line of text: paragraphs,
/// headings, and quotes. Doubles as the list-item heading-memory value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextTag {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    HeadingThree,
    HeadingFour,
    HeadingFive,
    HeadingSix,
    BlockQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Bulleted,
    Numbered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

/// What an element's `children` vector is allowed to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPolicy {
    /// Text leaves and inline elements only.
    Inline,
    /// List items only.
    ListItems,
}

impl ElementKind {
    pub fn is_list(self) -> bool {
        matches!(self, ElementKind::BulletedList | ElementKind::NumberedList)
    }

    pub fn is_text_tag(self) -> bool {
        self.as_text_tag().is_some()
    }

    pub fn is_heading(self) -> bool {
        matches!(
            self,
            ElementKind::HeadingOne
                | ElementKind::HeadingTwo
                | ElementKind::HeadingThree
                | ElementKind::HeadingFour
                | ElementKind::HeadingFive
                | ElementKind::HeadingSix
        )
    }

    /// Inline elements live inside text blocks instead of standing alone.
    pub fn is_inline(self) -> bool {
        matches!(self, ElementKind::Link)
    }

    /// Kinds that carry an `align` attribute: anything that renders as a
    /// standalone line. Containers align through their children.
    pub fn is_alignable(self) -> bool {
        self.is_text_tag() || self == ElementKind::ListItem
    }

    /// Blocks whose children are inline content and that the engines treat
    /// as the unit of block-level operations.
    pub fn is_text_block(self) -> bool {
        self.is_text_tag() || self == ElementKind::ListItem
    }

    pub fn as_text_tag(self) -> Option<TextTag> {
        match self {
            ElementKind::Paragraph => Some(TextTag::Paragraph),
            ElementKind::HeadingOne => Some(TextTag::HeadingOne),
            ElementKind::HeadingTwo => Some(TextTag::HeadingTwo),
            ElementKind::HeadingThree => Some(TextTag::HeadingThree),
            ElementKind::HeadingFour => Some(TextTag::HeadingFour),
            ElementKind::HeadingFive => Some(TextTag::HeadingFive),
            ElementKind::HeadingSix => Some(TextTag::HeadingSix),
            ElementKind::BlockQuote => Some(TextTag::BlockQuote),
            ElementKind::BulletedList
            | ElementKind::NumberedList
            | ElementKind::ListItem
            | ElementKind::Link
            | ElementKind::Image => None,
        }
    }

    pub fn as_list_kind(self) -> Option<ListKind> {
        match self {
            ElementKind::BulletedList => Some(ListKind::Bulleted),
            ElementKind::NumberedList => Some(ListKind::Numbered),
            _ => None,
        }
    }

    pub fn child_policy(self) -> ChildPolicy {
        match self {
            ElementKind::Paragraph
            | ElementKind::HeadingOne
            | ElementKind::HeadingTwo
            | ElementKind::HeadingThree
            | ElementKind::HeadingFour
            | ElementKind::HeadingFive
            | ElementKind::HeadingSix
            | ElementKind::BlockQuote
            | ElementKind::ListItem
            | ElementKind::Link
            | ElementKind::Image => ChildPolicy::Inline,
            ElementKind::BulletedList | ElementKind::NumberedList => ChildPolicy::ListItems,
        }
    }
}

impl TextTag {
    pub fn is_heading(self) -> bool {
        ElementKind::from(self).is_heading()
    }
}

impl From<TextTag> for ElementKind {
    fn from(tag: TextTag) -> Self {
        match tag {
            TextTag::Paragraph => ElementKind::Paragraph,
            TextTag::HeadingOne => ElementKind::HeadingOne,
            TextTag::HeadingTwo => ElementKind::HeadingTwo,
            TextTag::HeadingThree => ElementKind::HeadingThree,
            TextTag::HeadingFour => ElementKind::HeadingFour,
            TextTag::HeadingFive => ElementKind::HeadingFive,
            TextTag::HeadingSix => ElementKind::HeadingSix,
            TextTag::BlockQuote => ElementKind::BlockQuote,
        }
    }
}

impl From<ListKind> for ElementKind {
    fn from(kind: ListKind) -> Self {
        match kind {
            ListKind::Bulleted => ElementKind::BulletedList,
            ListKind::Numbered => ElementKind::NumberedList,
        }
    }
}
