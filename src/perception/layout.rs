/// Coarse page-structure summary over a finished element list.
///
/// Region bands are thirds of the detection extent (the largest `x2`/`y2`
/// among the elements), not of the image.
use std::collections::BTreeMap;

use crate::perception::types::{DensityLevel, Element, LayoutSummary, LayoutType, Region};

pub fn analyze_layout(elements: &[Element]) -> LayoutSummary {
    if elements.is_empty() {
        return LayoutSummary {
            layout_type: LayoutType::Empty,
            regions: BTreeMap::new(),
            density: None,
        };
    }

    let max_x = elements.iter().map(|e| e.bbox[2]).max().unwrap_or(0) as f64;
    let max_y = elements.iter().map(|e| e.bbox[3]).max().unwrap_or(0) as f64;

    let mut regions: BTreeMap<Region, Vec<String>> = [
        Region::Top,
        Region::Middle,
        Region::Bottom,
        Region::Left,
        Region::Center,
        Region::Right,
    ]
    .into_iter()
    .map(|r| (r, Vec::new()))
    .collect();

    for e in elements {
        let [cx, cy] = e.center;
        let vertical = band(cy as f64, max_y, [Region::Top, Region::Middle, Region::Bottom]);
        let horizontal = band(cx as f64, max_x, [Region::Left, Region::Center, Region::Right]);
        for region in [vertical, horizontal] {
            if let Some(ids) = regions.get_mut(&region) {
                ids.push(e.id.clone());
            }
        }
    }

    let count = |r: Region| regions.get(&r).map_or(0, Vec::len);
    let (top, middle, bottom) = (count(Region::Top), count(Region::Middle), count(Region::Bottom));
    let (left, center, right) = (count(Region::Left), count(Region::Center), count(Region::Right));

    let layout_type = if top > middle + bottom {
        LayoutType::HeaderHeavy
    } else if bottom > top + middle {
        LayoutType::FooterHeavy
    } else if left > center + right {
        LayoutType::SidebarLeft
    } else if right > center + left {
        LayoutType::SidebarRight
    } else {
        LayoutType::Balanced
    };

    LayoutSummary {
        layout_type,
        regions,
        density: Some(density_for(elements.len())),
    }
}

pub fn density_for(count: usize) -> DensityLevel {
    match count {
        0 => DensityLevel::Empty,
        1..=9 => DensityLevel::Sparse,
        10..=29 => DensityLevel::Moderate,
        _ => DensityLevel::Dense,
    }
}

/// Lower third, middle third or the rest; boundaries go to the later band.
fn band(v: f64, extent: f64, bands: [Region; 3]) -> Region {
    if v < extent / 3.0 {
        bands[0]
    } else if v < 2.0 * extent / 3.0 {
        bands[1]
    } else {
        bands[2]
    }
}
