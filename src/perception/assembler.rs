/// Turns raw detections into typed, labelled elements and buckets them.
use image::RgbImage;

use crate::perception::captioner::{caption_or_fallback, crop_region};
use crate::perception::classifier::{classify_contour, classify_element};
use crate::perception::traits::Captioner;
use crate::perception::types::{DetectionSet, Element, ElementType, RawDetection};

/// Which typing rules apply to a batch of detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationPolicy {
    /// Geometry then edge-density texture check.
    Full,
    /// Collapsed icon/button/text split for contour boxes; no captioning.
    ContourGeometry,
}

pub struct ElementAssembler<'a> {
    image: &'a RgbImage,
    captioner: Option<&'a mut (dyn Captioner + 'static)>,
    policy: ClassificationPolicy,
}

impl<'a> ElementAssembler<'a> {
    pub fn new(image: &'a RgbImage) -> Self {
        Self {
            image,
            captioner: None,
            policy: ClassificationPolicy::Full,
        }
    }

    /// Caption interactable elements with `captioner`.
    pub fn with_captioner(mut self, captioner: Option<&'a mut (dyn Captioner + 'static)>) -> Self {
        self.captioner = captioner;
        self
    }

    pub fn with_policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// One element per detection, ids `element_{i}` in input order.
    pub fn assemble(mut self, raws: &[RawDetection]) -> DetectionSet {
        let mut set = DetectionSet::new();
        for (i, raw) in raws.iter().enumerate() {
            let element = self.build(i, raw);
            set.push(element);
        }
        set
    }

    fn build(&mut self, index: usize, raw: &RawDetection) -> Element {
        let bbox = raw.pixel_bbox();
        let [x1, y1, x2, y2] = raw.bbox;

        let element_type = match self.policy {
            ClassificationPolicy::Full => {
                let crop = crop_region(self.image, bbox);
                classify_element(&crop, bbox, raw.class_id)
            }
            ClassificationPolicy::ContourGeometry => {
                let width = (bbox[2] - bbox[0]).max(0) as u32;
                let height = (bbox[3] - bbox[1]).max(0) as u32;
                classify_contour(width, height)
            }
        };
        let interactable = element_type.is_interactable();

        let label = match (&mut self.captioner, self.policy) {
            (Some(captioner), ClassificationPolicy::Full) if interactable => {
                caption_or_fallback(&mut **captioner, self.image, bbox)
            }
            _ => synthesized_label(element_type, index),
        };

        Element {
            id: format!("element_{index}"),
            element_type,
            bbox,
            confidence: raw.confidence,
            center: [((x1 + x2) / 2.0) as i32, ((y1 + y2) / 2.0) as i32],
            area: ((x2 - x1) * (y2 - y1)).max(0.0) as u32,
            label,
            interactable,
        }
    }
}

fn synthesized_label(element_type: ElementType, index: usize) -> String {
    format!("{element_type}_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ParserError, ParserResult};
    use image::Rgb;

    struct CountingCaptioner {
        calls: usize,
    }

    impl Captioner for CountingCaptioner {
        fn caption(&mut self, _crop: &RgbImage) -> ParserResult<String> {
            self.calls += 1;
            Ok(format!("caption {}", self.calls))
        }
    }

    struct Broken;

    impl Captioner for Broken {
        fn caption(&mut self, _crop: &RgbImage) -> ParserResult<String> {
            Err(ParserError::Caption("bad crop".into()))
        }
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection {
            bbox: [x1, y1, x2, y2],
            confidence: 0.8,
            class_id: 0,
        }
    }

    /// Striped band at rows 300..400 so a square box there reads as text.
    fn screen() -> RgbImage {
        RgbImage::from_fn(800, 600, |x, y| {
            if (300..400).contains(&y) && (x / 4) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    fn mixed_detections() -> Vec<RawDetection> {
        vec![
            det(10.0, 10.0, 40.0, 40.0),     // icon
            det(100.0, 100.0, 300.0, 150.0), // button (wide)
            det(100.0, 300.0, 200.0, 400.0), // text (textured square)
            det(600.0, 0.0, 650.0, 300.0),   // sidebar (tall)
            det(400.0, 100.0, 500.0, 200.0), // button (flat square)
        ]
    }

    #[test]
    fn elements_are_typed_and_bucketed() {
        let img = screen();
        let set = ElementAssembler::new(&img).assemble(&mixed_detections());

        let types: Vec<ElementType> = set.all_elements().iter().map(|e| e.element_type).collect();
        assert_eq!(
            types,
            vec![
                ElementType::Icon,
                ElementType::Button,
                ElementType::Text,
                ElementType::Sidebar,
                ElementType::Button
            ]
        );
        assert_eq!(set.icons().count(), 1);
        assert_eq!(set.buttons().count(), 2);
        assert_eq!(set.text().count(), 1);
        assert_eq!(set.interactable().count(), 3);
    }

    #[test]
    fn geometry_fields_follow_the_box() {
        let img = screen();
        let set = ElementAssembler::new(&img).assemble(&[det(100.5, 100.0, 301.5, 150.0)]);
        let e = &set.all_elements()[0];
        assert_eq!(e.id, "element_0");
        assert_eq!(e.bbox, [100, 100, 301, 150]);
        assert_eq!(e.center, [201, 125]);
        assert_eq!(e.area, 10050);
        assert_eq!(e.confidence, 0.8);
    }

    #[test]
    fn interactable_matches_type_for_every_element() {
        let img = screen();
        let set = ElementAssembler::new(&img).assemble(&mixed_detections());
        for e in set.all_elements() {
            assert_eq!(
                e.interactable,
                matches!(e.element_type, ElementType::Button | ElementType::Icon)
            );
        }
    }

    #[test]
    fn every_bucket_member_is_in_all_elements() {
        let img = screen();
        let set = ElementAssembler::new(&img).assemble(&mixed_detections());
        let ids: Vec<&str> = set.all_elements().iter().map(|e| e.id.as_str()).collect();
        for e in set
            .icons()
            .chain(set.buttons())
            .chain(set.text())
            .chain(set.interactable())
        {
            assert!(ids.contains(&e.id.as_str()));
        }
    }

    #[test]
    fn sidebar_lands_in_no_dedicated_bucket() {
        let img = screen();
        let set = ElementAssembler::new(&img).assemble(&[det(600.0, 0.0, 650.0, 300.0)]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.icons().count() + set.buttons().count() + set.text().count(), 0);
        assert_eq!(set.interactable().count(), 0);
    }

    #[test]
    fn only_interactable_elements_are_captioned() {
        let img = screen();
        let mut captioner = CountingCaptioner { calls: 0 };
        let set = ElementAssembler::new(&img)
            .with_captioner(Some(&mut captioner))
            .assemble(&mixed_detections());

        let labels: Vec<&str> = set.all_elements().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["caption 1", "caption 2", "text_2", "sidebar_3", "caption 3"]
        );
        assert_eq!(captioner.calls, 3);
    }

    #[test]
    fn without_captioner_labels_are_synthesized() {
        let img = screen();
        let set = ElementAssembler::new(&img).assemble(&mixed_detections());
        assert_eq!(set.all_elements()[0].label, "icon_0");
        assert_eq!(set.all_elements()[1].label, "button_1");
    }

    #[test]
    fn caption_failure_still_produces_element() {
        let img = screen();
        let mut broken = Broken;
        let set = ElementAssembler::new(&img)
            .with_captioner(Some(&mut broken))
            .assemble(&[det(10.0, 10.0, 40.0, 40.0)]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.all_elements()[0].label, "element");
    }

    #[test]
    fn contour_policy_uses_collapsed_split_and_skips_captioning() {
        let img = screen();
        let mut captioner = CountingCaptioner { calls: 0 };
        let set = ElementAssembler::new(&img)
            .with_captioner(Some(&mut captioner))
            .with_policy(ClassificationPolicy::ContourGeometry)
            .assemble(&[det(600.0, 0.0, 650.0, 300.0), det(10.0, 10.0, 40.0, 40.0)]);

        assert_eq!(set.all_elements()[0].element_type, ElementType::Text);
        assert_eq!(set.all_elements()[0].label, "text_0");
        assert_eq!(set.all_elements()[1].label, "icon_1");
        assert_eq!(captioner.calls, 0);
    }

    #[test]
    fn serialized_buckets_carry_full_elements() {
        let img = screen();
        let set = ElementAssembler::new(&img).assemble(&mixed_detections());
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["all_elements"].as_array().unwrap().len(), 5);
        assert_eq!(json["buttons"][1]["id"], "element_4");
        assert_eq!(json["icons"][0]["type"], "icon");
        assert_eq!(json["icons"][0]["bbox"], serde_json::json!([10, 10, 40, 40]));
    }
}
