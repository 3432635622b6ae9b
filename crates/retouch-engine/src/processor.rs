use crate::config::{ComposeMode, RetouchConfig};
use crate::frame::Frame;
use image::RgbImage;
use retouch_core::features::{
    FACE_OVAL, FOREHEAD, LEFT_BROW, LEFT_EYE, LOWER_LIP, MOUTH_INSIDE, RIGHT_BROW, RIGHT_EYE,
    UPPER_LIP,
};
use retouch_core::{
    apply_channel_adjustment, apply_smoothing, apply_tint, build_all_masks, build_mask,
    compute_face_box,
    merge_layers, predict_forehead_mask, ConfigError, EditOutcome, FaceBox, FeatureIndexSet,
    FeatureMap, Landmarks, Mask,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Features the processor needs; checked once at construction.
pub const REQUIRED_FEATURES: [&str; 9] = [
    FACE_OVAL, FOREHEAD, UPPER_LIP, LOWER_LIP, MOUTH_INSIDE, LEFT_EYE, RIGHT_EYE, LEFT_BROW,
    RIGHT_BROW,
];

/// Features cut out of the skin-smoothing region.
const SKIN_EXCLUSIONS: [&str; 7] = [
    LEFT_EYE, RIGHT_EYE, LEFT_BROW, RIGHT_BROW, UPPER_LIP, LOWER_LIP, MOUTH_INSIDE,
];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("unsupported color type: {0}; expected 8-bit or f32 RGB/RGBA")]
    UnsupportedColorType(String),
}

/// One of the localized edits the processor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Smoothing,
    Tint,
    Whitening,
}

impl Edit {
    fn apply(self, image: &mut RgbImage, mask: &Mask, config: &RetouchConfig) -> EditOutcome {
        match self {
            Edit::Smoothing => apply_smoothing(image, mask, &config.smoothing),
            Edit::Tint => apply_tint(image, mask, &config.tint),
            Edit::Whitening => apply_channel_adjustment(image, mask, &config.whitening),
        }
    }
}

/// What happened to one frame. `None` means the edit is disabled.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub sequence: u64,
    pub face_box: Option<FaceBox>,
    /// The face box came from an earlier frame because this frame's was degenerate.
    pub fallback_face_box: bool,
    pub smoothing: Option<EditOutcome>,
    pub tint: Option<EditOutcome>,
    pub whitening: Option<EditOutcome>,
}

impl FrameReport {
    fn record(&mut self, edit: Edit, outcome: EditOutcome) {
        let slot = match edit {
            Edit::Smoothing => &mut self.smoothing,
            Edit::Tint => &mut self.tint,
            Edit::Whitening => &mut self.whitening,
        };
        *slot = Some(outcome);
    }
}

/// Feature index sets resolved once from the feature map.
struct ResolvedFeatures {
    face_oval: FeatureIndexSet,
    forehead: FeatureIndexSet,
    upper_lip: FeatureIndexSet,
    lower_lip: FeatureIndexSet,
    mouth_inside: FeatureIndexSet,
    exclusions: Vec<FeatureIndexSet>,
}

/// Masks built for the current frame.
struct FrameMasks {
    face_oval: Mask,
    forehead_seed: Mask,
    lips: Mask,
    mouth_inside: Mask,
    excluded: Mask,
}

/// Runs mask building, region analysis, compositing, and merging for one face per frame.
///
/// Holds no per-frame buffers; the only state carried between frames is the
/// last valid face box, used when a frame's own box is degenerate.
pub struct FrameProcessor {
    map: FeatureMap,
    features: ResolvedFeatures,
    config: RetouchConfig,
    last_face_box: Option<FaceBox>,
}

impl FrameProcessor {
    /// Resolve the configured feature map and build a processor. Fails fast on
    /// any configuration problem.
    pub fn new(config: RetouchConfig) -> Result<Self, EngineError> {
        let map = config.feature_map()?;
        Self::with_feature_map(&map, config)
    }

    pub fn with_feature_map(map: &FeatureMap, config: RetouchConfig) -> Result<Self, EngineError> {
        map.require(&REQUIRED_FEATURES)?;
        let get = |name: &str| map.feature(name).cloned();

        let features = ResolvedFeatures {
            face_oval: get(FACE_OVAL)?,
            forehead: get(FOREHEAD)?,
            upper_lip: get(UPPER_LIP)?,
            lower_lip: get(LOWER_LIP)?,
            mouth_inside: get(MOUTH_INSIDE)?,
            exclusions: SKIN_EXCLUSIONS
                .iter()
                .map(|&name| get(name))
                .collect::<Result<_, _>>()?,
        };

        tracing::info!(
            features = map.len(),
            landmark_count = ?map.landmark_count,
            mode = ?config.compose_mode,
            smoothing = config.smoothing_enabled,
            tint = config.tint_enabled,
            whitening = config.whitening_enabled,
            "frame processor ready"
        );

        Ok(Self {
            map: map.clone(),
            features,
            config,
            last_face_box: None,
        })
    }

    pub fn config(&self) -> &RetouchConfig {
        &self.config
    }

    pub fn last_face_box(&self) -> Option<FaceBox> {
        self.last_face_box
    }

    /// Every feature of the loaded map rasterized for one frame, keyed by name.
    pub fn feature_masks(
        &self,
        landmarks: &Landmarks,
        width: u32,
        height: u32,
    ) -> BTreeMap<String, Mask> {
        build_all_masks(&self.map, landmarks, width, height)
    }

    /// Apply every enabled edit to `frame` in place.
    ///
    /// Degenerate masks and regions skip the affected edit; they never fail
    /// the frame.
    pub fn process(&mut self, frame: &mut Frame, landmarks: &Landmarks) -> FrameReport {
        let (w, h) = frame.image.dimensions();
        let masks = self.build_masks(landmarks, w, h);
        let (face_box, fallback_face_box) = self.resolve_face_box(landmarks, w, h);

        let mut plan = Vec::with_capacity(3);
        if self.config.smoothing_enabled {
            plan.push((Edit::Smoothing, skin_mask(&frame.image, &masks, face_box)));
        }
        if self.config.tint_enabled {
            plan.push((Edit::Tint, masks.lips.clone()));
        }
        if self.config.whitening_enabled {
            plan.push((Edit::Whitening, masks.mouth_inside.clone()));
        }

        let mut report = FrameReport {
            sequence: frame.sequence,
            face_box,
            fallback_face_box,
            smoothing: None,
            tint: None,
            whitening: None,
        };

        match self.config.compose_mode {
            ComposeMode::InPlace => {
                for (edit, mask) in &plan {
                    let outcome = edit.apply(&mut frame.image, mask, &self.config);
                    report.record(*edit, outcome);
                }
            }
            ComposeMode::Layered => {
                let background = frame.image.clone();
                let mut layers = Vec::with_capacity(plan.len());
                for (edit, mask) in plan {
                    let mut layer = background.clone();
                    let outcome = edit.apply(&mut layer, &mask, &self.config);
                    if outcome.is_applied() {
                        layers.push((layer, mask));
                    }
                    report.record(edit, outcome);
                }
                frame.image = merge_layers(&layers, &background);
            }
        }

        tracing::debug!(
            sequence = report.sequence,
            smoothing = ?report.smoothing,
            tint = ?report.tint,
            whitening = ?report.whitening,
            "frame processed"
        );
        report
    }

    fn build_masks(&self, landmarks: &Landmarks, w: u32, h: u32) -> FrameMasks {
        let f = &self.features;
        let build = |set: &FeatureIndexSet| build_mask(set, landmarks, w, h);

        let excluded = f
            .exclusions
            .iter()
            .map(|set| build(set))
            .fold(Mask::new(w, h), |acc, m| acc.union(&m));

        FrameMasks {
            face_oval: build(&f.face_oval),
            forehead_seed: build(&f.forehead),
            lips: build(&f.upper_lip).union(&build(&f.lower_lip)),
            mouth_inside: build(&f.mouth_inside),
            excluded,
        }
    }

    /// This frame's face box, or the previous frame's when this one is degenerate.
    fn resolve_face_box(&mut self, landmarks: &Landmarks, w: u32, h: u32) -> (Option<FaceBox>, bool) {
        let face_box = compute_face_box(landmarks, w, h);
        if face_box.is_valid() {
            self.last_face_box = Some(face_box);
            return (Some(face_box), false);
        }

        match self.last_face_box {
            Some(previous) => {
                tracing::warn!(?previous, "degenerate face box; reusing previous frame's");
                (Some(previous), true)
            }
            None => {
                tracing::debug!("degenerate face box and no previous frame");
                (None, false)
            }
        }
    }
}

/// Smoothing region: (face oval ∪ adaptive forehead) minus eyes, brows, lips and mouth.
///
/// The forehead prediction needs a valid face box and is left out without one.
fn skin_mask(image: &RgbImage, masks: &FrameMasks, face_box: Option<FaceBox>) -> Mask {
    let forehead = match face_box {
        Some(fb) if !masks.face_oval.is_empty() => {
            predict_forehead_mask(image, &masks.forehead_seed, fb.min_y)
        }
        _ => Mask::new(image.width(), image.height()),
    };
    masks.face_oval.union(&forehead).subtract(&masks.excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, Rgba, RgbaImage};
    use retouch_core::{color, Landmark, SkipReason};

    const HAIR: Rgb<u8> = Rgb([30, 25, 20]);
    const SKIN: Rgb<u8> = Rgb([205, 160, 135]);
    const LIP: Rgb<u8> = Rgb([170, 90, 90]);
    const TEETH: Rgb<u8> = Rgb([235, 220, 170]);

    /// Rectangles as `[x0, y0, x1, y1]`, one per feature, in feature-map order.
    const RECTS: [(&str, [f32; 4]); 9] = [
        (FACE_OVAL, [40.0, 20.0, 160.0, 190.0]),
        (FOREHEAD, [50.0, 24.0, 150.0, 60.0]),
        (LEFT_EYE, [60.0, 80.0, 90.0, 96.0]),
        (RIGHT_EYE, [110.0, 80.0, 140.0, 96.0]),
        (LEFT_BROW, [60.0, 66.0, 90.0, 74.0]),
        (RIGHT_BROW, [110.0, 66.0, 140.0, 74.0]),
        (UPPER_LIP, [70.0, 132.0, 130.0, 144.0]),
        (MOUTH_INSIDE, [60.0, 144.0, 140.0, 176.0]),
        (LOWER_LIP, [70.0, 176.0, 130.0, 188.0]),
    ];

    fn test_feature_map() -> FeatureMap {
        FeatureMap::from_sets(
            Some(RECTS.len() * 4),
            RECTS
                .iter()
                .enumerate()
                .map(|(i, (name, _))| FeatureIndexSet::new(*name, (i * 4..i * 4 + 4).collect())),
        )
        .unwrap()
    }

    fn test_landmarks() -> Landmarks {
        Landmarks::pixel(
            RECTS
                .iter()
                .flat_map(|(_, [x0, y0, x1, y1])| {
                    [
                        Landmark::new(*x0, *y0),
                        Landmark::new(*x1, *y0),
                        Landmark::new(*x1, *y1),
                        Landmark::new(*x0, *y1),
                    ]
                })
                .collect(),
        )
    }

    fn inside(name: &str, x: u32, y: u32) -> bool {
        RECTS.iter().any(|(n, [x0, y0, x1, y1])| {
            *n == name && (x as f32) >= *x0 && (x as f32) < *x1 && (y as f32) >= *y0 && (y as f32) < *y1
        })
    }

    fn test_face() -> RgbImage {
        RgbImage::from_fn(200, 200, |x, y| {
            if inside(UPPER_LIP, x, y) || inside(LOWER_LIP, x, y) {
                LIP
            } else if inside(MOUTH_INSIDE, x, y) {
                TEETH
            } else if inside(FACE_OVAL, x, y) {
                SKIN
            } else {
                HAIR
            }
        })
    }

    fn processor(mode: ComposeMode) -> FrameProcessor {
        let config = RetouchConfig {
            compose_mode: mode,
            ..RetouchConfig::default()
        };
        FrameProcessor::with_feature_map(&test_feature_map(), config).unwrap()
    }

    fn assert_face_edited(original: &RgbImage, edited: &RgbImage) {
        assert_ne!(edited.get_pixel(100, 138), original.get_pixel(100, 138), "lips untouched");
        assert!(
            color::luminance(*edited.get_pixel(100, 160)) > color::luminance(TEETH),
            "teeth not whitened"
        );
        assert_eq!(edited.get_pixel(5, 5), original.get_pixel(5, 5));
        assert_eq!(edited.get_pixel(190, 100), original.get_pixel(190, 100));
    }

    #[test]
    fn test_process_in_place_applies_all_edits() {
        let mut proc = processor(ComposeMode::InPlace);
        let original = test_face();
        let mut frame = Frame::from_rgb(original.clone(), 1);

        let report = proc.process(&mut frame, &test_landmarks());

        assert!(report.smoothing.unwrap().is_applied());
        assert!(report.tint.unwrap().is_applied());
        assert!(report.whitening.unwrap().is_applied());
        assert!(!report.fallback_face_box);

        let fb = report.face_box.unwrap();
        assert_eq!((fb.min_x, fb.max_x, fb.max_y), (40.0, 160.0, 190.0));
        assert!((fb.min_y - 18.0).abs() < 1e-4);

        assert_face_edited(&original, &frame.image);
    }

    #[test]
    fn test_process_layered_matches_edit_regions() {
        let mut proc = processor(ComposeMode::Layered);
        let original = test_face();
        let mut frame = Frame::from_rgb(original.clone(), 1);

        let report = proc.process(&mut frame, &test_landmarks());
        assert!(report.tint.unwrap().is_applied());
        assert_face_edited(&original, &frame.image);
    }

    #[test]
    fn test_no_face_leaves_frame_untouched() {
        let mut proc = processor(ComposeMode::InPlace);
        let original = test_face();
        let mut frame = Frame::from_rgb(original.clone(), 3);

        let report = proc.process(&mut frame, &Landmarks::pixel(vec![]));

        assert_eq!(report.face_box, None);
        assert_eq!(report.tint, Some(EditOutcome::Skipped(SkipReason::EmptyMask)));
        assert_eq!(report.smoothing, Some(EditOutcome::Skipped(SkipReason::EmptyMask)));
        assert_eq!(report.whitening, Some(EditOutcome::Skipped(SkipReason::EmptyMask)));
        assert_eq!(frame.image, original);
    }

    #[test]
    fn test_degenerate_face_box_falls_back_to_previous() {
        let mut proc = processor(ComposeMode::InPlace);
        let mut frame = Frame::from_rgb(test_face(), 1);
        let first = proc.process(&mut frame, &test_landmarks());

        let mut next = Frame::from_rgb(test_face(), 2);
        let second = proc.process(&mut next, &Landmarks::pixel(vec![Landmark::new(5.0, 5.0)]));

        assert!(second.fallback_face_box);
        assert_eq!(second.face_box, first.face_box);
        assert_eq!(proc.last_face_box(), first.face_box);
    }

    #[test]
    fn test_disabled_edits_are_not_reported() {
        let config = RetouchConfig {
            smoothing_enabled: false,
            whitening_enabled: false,
            ..RetouchConfig::default()
        };
        let mut proc = FrameProcessor::with_feature_map(&test_feature_map(), config).unwrap();
        let original = test_face();
        let mut frame = Frame::from_rgb(original.clone(), 1);

        let report = proc.process(&mut frame, &test_landmarks());
        assert!(report.smoothing.is_none());
        assert!(report.whitening.is_none());
        assert!(report.tint.unwrap().is_applied());
        assert_eq!(frame.image.get_pixel(100, 160), original.get_pixel(100, 160));
    }

    #[test]
    fn test_missing_feature_fails_at_construction() {
        let map = FeatureMap::from_sets(None, [FeatureIndexSet::new(FACE_OVAL, vec![0, 1, 2])]).unwrap();
        let err = FrameProcessor::with_feature_map(&map, RetouchConfig::default())
            .err()
            .unwrap();
        assert!(
            matches!(err, EngineError::Config(ConfigError::MissingFeature(_))),
            "{err}"
        );
    }

    #[test]
    fn test_rgba_frame_keeps_alpha_through_processing() {
        let mut proc = processor(ComposeMode::InPlace);
        let face = test_face();
        let rgba = RgbaImage::from_fn(200, 200, |x, y| {
            let [r, g, b] = face.get_pixel(x, y).0;
            Rgba([r, g, b, 200])
        });
        let mut frame = Frame::from_dynamic(DynamicImage::ImageRgba8(rgba), 9).unwrap();
        proc.process(&mut frame, &test_landmarks());

        let out = frame.into_dynamic().to_rgba8();
        assert!(out.pixels().all(|p| p[3] == 200));
    }

    #[test]
    fn test_feature_masks_cover_every_feature() {
        let proc = processor(ComposeMode::InPlace);
        let masks = proc.feature_masks(&test_landmarks(), 200, 200);

        assert_eq!(masks.len(), RECTS.len());
        let lips = &masks[UPPER_LIP];
        assert_eq!(lips.dimensions(), (200, 200));
        assert_eq!(lips.get(100, 138), 255);
        assert_eq!(lips.get(100, 160), 0);
        assert!(masks.values().all(|m| !m.is_empty()));
    }

    #[test]
    fn test_default_processor_with_embedded_map() {
        let proc = FrameProcessor::new(RetouchConfig::default()).unwrap();
        assert!(proc.last_face_box().is_none());
        assert_eq!(proc.config().compose_mode, ComposeMode::InPlace);
    }
}
