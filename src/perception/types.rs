use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Icon,
    Button,
    Text,
    Sidebar,
    Unknown,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Icon => "icon",
            ElementType::Button => "button",
            ElementType::Text => "text",
            ElementType::Sidebar => "sidebar",
            ElementType::Unknown => "unknown",
        }
    }

    /// Buttons and icons are the clickable kinds.
    pub fn is_interactable(&self) -> bool {
        matches!(self, ElementType::Button | ElementType::Icon)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector output before classification and ID assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// [x1, y1, x2, y2] in source-image pixels.
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

impl RawDetection {
    /// Integer pixel rectangle (truncating, as the box is reported).
    pub fn pixel_bbox(&self) -> [i32; 4] {
        let [x1, y1, x2, y2] = self.bbox;
        [x1 as i32, y1 as i32, x2 as i32, y2 as i32]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    /// [x1, y1, x2, y2] in pixels.
    pub bbox: [i32; 4],
    pub confidence: f32,
    pub center: [i32; 2],
    pub area: u32,
    pub label: String,
    pub interactable: bool,
}

/// Elements of one request. `all_elements` owns them; the named buckets hold
/// indices into it, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
    all_elements: Vec<Element>,
    icons: Vec<usize>,
    buttons: Vec<usize>,
    text: Vec<usize>,
    interactable: Vec<usize>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element and record its bucket memberships.
    pub(crate) fn push(&mut self, element: Element) {
        let idx = self.all_elements.len();
        match element.element_type {
            ElementType::Icon => self.icons.push(idx),
            ElementType::Button => self.buttons.push(idx),
            ElementType::Text => self.text.push(idx),
            ElementType::Sidebar | ElementType::Unknown => {}
        }
        if element.interactable {
            self.interactable.push(idx);
        }
        self.all_elements.push(element);
    }

    pub fn all_elements(&self) -> &[Element] {
        &self.all_elements
    }

    pub fn icons(&self) -> impl Iterator<Item = &Element> + '_ {
        self.bucket(&self.icons)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Element> + '_ {
        self.bucket(&self.buttons)
    }

    pub fn text(&self) -> impl Iterator<Item = &Element> + '_ {
        self.bucket(&self.text)
    }

    pub fn interactable(&self) -> impl Iterator<Item = &Element> + '_ {
        self.bucket(&self.interactable)
    }

    pub fn len(&self) -> usize {
        self.all_elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_elements.is_empty()
    }

    pub fn summary(&self) -> ParseSummary {
        ParseSummary {
            total_elements: self.all_elements.len(),
            interactable_count: self.interactable.len(),
            icon_count: self.icons.len(),
            button_count: self.buttons.len(),
            text_count: self.text.len(),
        }
    }

    fn view<'a>(&'a self, members: &'a [usize]) -> BucketView<'a> {
        BucketView {
            elements: &self.all_elements,
            members,
        }
    }

    fn bucket<'a>(&'a self, members: &'a [usize]) -> impl Iterator<Item = &'a Element> + 'a {
        members.iter().map(move |&i| &self.all_elements[i])
    }
}

/// Serializes one bucket as a list of full element objects.
struct BucketView<'a> {
    elements: &'a [Element],
    members: &'a [usize],
}

impl Serialize for BucketView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.members.iter().map(|&i| &self.elements[i]))
    }
}

impl Serialize for DetectionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("DetectionSet", 5)?;
        s.serialize_field("icons", &self.view(&self.icons))?;
        s.serialize_field("buttons", &self.view(&self.buttons))?;
        s.serialize_field("text", &self.view(&self.text))?;
        s.serialize_field("interactable", &self.view(&self.interactable))?;
        s.serialize_field("all_elements", &self.all_elements)?;
        s.end()
    }
}

/// Thirds of the detection extent. Declaration order is the output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Top,
    Middle,
    Bottom,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutType {
    Empty,
    HeaderHeavy,
    FooterHeavy,
    SidebarLeft,
    SidebarRight,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityLevel {
    Empty,
    Sparse,
    Moderate,
    Dense,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutSummary {
    #[serde(rename = "type")]
    pub layout_type: LayoutType,
    pub regions: BTreeMap<Region, Vec<String>>,
    /// Absent for an empty page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<DensityLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParseSummary {
    pub total_elements: usize,
    pub interactable_count: usize,
    pub icon_count: usize,
    pub button_count: usize,
    pub text_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub image_path: String,
    pub summary: ParseSummary,
    pub elements: DetectionSet,
    pub layout: LayoutSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<String>,
}
