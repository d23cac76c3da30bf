//! Layout partitioner.
//!
//! A slot's layout tag says how many screens each logical region of the
//! slot occupies, left to right. `"2-1-1"` is one region spanning two
//! screens followed by two single-screen regions. Given a screen's position
//! in its group, [`partition`] finds the region (hence the media reference)
//! that screen renders and which horizontal slice of it.

use serde::{Deserialize, Serialize};

use crate::types::MediaId;

/// Closed set of slot shapes.
///
/// Serialized as its tag string. Unknown tags decode to
/// [`Layout::FullBleed`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Layout {
    /// `"1"`..`"4"`: a single region spanning N screens.
    Span1,
    Span2,
    Span3,
    Span4,
    /// `"1-1"`
    Split11,
    /// `"1-2"`
    Split12,
    /// `"2-1"`
    Split21,
    /// `"2-2"`
    Split22,
    /// `"1-1-1"`
    Split111,
    /// `"1-1-2"`
    Split112,
    /// `"1-2-1"`
    Split121,
    /// `"2-1-1"`
    Split211,
    /// `"1-1-1-1"`
    Split1111,
    /// Fallback for unknown tags: one region covering the whole group.
    FullBleed,
}

const TAGS: &[(&str, Layout)] = &[
    ("1", Layout::Span1),
    ("2", Layout::Span2),
    ("3", Layout::Span3),
    ("4", Layout::Span4),
    ("1-1", Layout::Split11),
    ("1-2", Layout::Split12),
    ("2-1", Layout::Split21),
    ("2-2", Layout::Split22),
    ("1-1-1", Layout::Split111),
    ("1-1-2", Layout::Split112),
    ("1-2-1", Layout::Split121),
    ("2-1-1", Layout::Split211),
    ("1-1-1-1", Layout::Split1111),
];

impl Layout {
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        TAGS.iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, layout)| *layout)
            .unwrap_or(Layout::FullBleed)
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Layout::Span1 => "1",
            Layout::Span2 => "2",
            Layout::Span3 => "3",
            Layout::Span4 => "4",
            Layout::Split11 => "1-1",
            Layout::Split12 => "1-2",
            Layout::Split21 => "2-1",
            Layout::Split22 => "2-2",
            Layout::Split111 => "1-1-1",
            Layout::Split112 => "1-1-2",
            Layout::Split121 => "1-2-1",
            Layout::Split211 => "2-1-1",
            Layout::Split1111 => "1-1-1-1",
            Layout::FullBleed => "full",
        }
    }

    /// Span width of every region, in region order.
    pub fn spans(&self, group_size: usize) -> Vec<usize> {
        match self {
            Layout::Span1 => vec![1],
            Layout::Span2 => vec![2],
            Layout::Span3 => vec![3],
            Layout::Span4 => vec![4],
            Layout::Split11 => vec![1, 1],
            Layout::Split12 => vec![1, 2],
            Layout::Split21 => vec![2, 1],
            Layout::Split22 => vec![2, 2],
            Layout::Split111 => vec![1, 1, 1],
            Layout::Split112 => vec![1, 1, 2],
            Layout::Split121 => vec![1, 2, 1],
            Layout::Split211 => vec![2, 1, 1],
            Layout::Split1111 => vec![1, 1, 1, 1],
            Layout::FullBleed => vec![group_size.max(1)],
        }
    }

    /// Number of media references a slot with this layout carries.
    pub fn region_count(&self) -> usize {
        self.spans(1).len()
    }
}

impl From<String> for Layout {
    fn from(tag: String) -> Self {
        Layout::from_tag(&tag)
    }
}

impl std::str::FromStr for Layout {
    type Err = std::convert::Infallible;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Ok(Layout::from_tag(tag))
    }
}

impl From<Layout> for String {
    fn from(layout: Layout) -> Self {
        layout.as_tag().to_string()
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// What one screen renders for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Index of the region in the layout.
    pub region: usize,
    /// Media shown in that region; `None` renders blank.
    pub media_id: Option<MediaId>,
    /// How many screens the region spans.
    pub span_width: usize,
    /// This screen's zero-based offset inside the region.
    pub offset: usize,
}

impl Placement {
    /// Horizontal position of this screen's slice of the region, 0.0..=1.0.
    pub fn crop_fraction(&self) -> f64 {
        if self.span_width <= 1 {
            0.0
        } else {
            self.offset as f64 / (self.span_width - 1) as f64
        }
    }

    pub fn crop_percent(&self) -> f64 {
        self.crop_fraction() * 100.0
    }
}

/// Locate the region containing `position` and this screen's offset in it.
///
/// Returns `None` when the position lies past the last region, which the
/// caller renders blank.
pub fn partition(
    layout: Layout,
    media_ids: &[Option<MediaId>],
    position: usize,
    group_size: usize,
) -> Option<Placement> {
    let mut start = 0;
    for (region, width) in layout.spans(group_size).into_iter().enumerate() {
        if position < start + width {
            return Some(Placement {
                region,
                media_id: media_ids.get(region).cloned().flatten(),
                span_width: width,
                offset: position - start,
            });
        }
        start += width;
    }
    None
}
