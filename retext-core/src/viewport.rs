//! Native <-> viewport coordinate mapping.
//!
//! Viewport fields on a [`TextRun`] are always rebuilt from its native state,
//! the page height, the current scale and the page's frozen top inset. Nothing
//! here reads a previously computed viewport value.

use crate::geometry::{NativePoint, PageGeometry, ViewportPoint};
use crate::run::TextRun;

impl PageGeometry {
    pub fn to_viewport(&self, native: NativePoint, glyph_height: f32) -> ViewportPoint {
        let s = self.scale;
        ViewportPoint {
            x: (native.x - self.origin.x) * s,
            y: (self.page_top() - native.y - glyph_height - self.top_inset) * s,
        }
    }

    pub fn to_native(&self, viewport: ViewportPoint, glyph_height: f32) -> NativePoint {
        let s = self.scale;
        NativePoint {
            x: viewport.x / s + self.origin.x,
            y: self.page_top() - glyph_height - self.top_inset - viewport.y / s,
        }
    }
}

/// Native distance from `page_top` to the highest glyph box among `runs`.
pub fn top_inset(page_top: f32, runs: &[TextRun]) -> f32 {
    runs.iter()
        .map(|run| page_top - run.native_position().y - run.native_height())
        .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.min(v))))
        .unwrap_or(0.0)
}

pub fn map_run(run: &mut TextRun, geometry: &PageGeometry) {
    run.viewport_position = geometry.to_viewport(run.native_position(), run.native_height());
    run.viewport_font_size = run.effective_font_size() * geometry.scale;
}

pub fn remap(runs: &mut [TextRun], geometry: &PageGeometry) {
    for run in runs.iter_mut() {
        map_run(run, geometry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_runs;
    use crate::geometry::Transform;
    use crate::run::{RunStyle, TextRecord};

    fn sample_runs(geometry: PageGeometry) -> (Vec<TextRun>, PageGeometry) {
        let records = vec![
            TextRecord::new("Title", Transform::new(18.0, 0.0, 0.0, 18.0, 72.0, 720.0), 60.0, 18.0),
            TextRecord::new("Body", Transform::new(11.0, 0.0, 0.0, 11.0, 72.0, 400.5), 40.0, 11.0),
        ];
        let extraction = extract_runs(records, geometry, &RunStyle::default());
        (extraction.runs, extraction.geometry)
    }

    #[test]
    fn native_viewport_round_trip_recovers_position() {
        let (runs, geometry) = sample_runs(PageGeometry::new(612.0, 792.0, 1.5));
        for run in &runs {
            let back = geometry.to_native(run.viewport_position(), run.native_height());
            assert!((back.x - run.native_position().x).abs() < 1e-3);
            assert!((back.y - run.native_position().y).abs() < 1e-3);
        }
    }

    #[test]
    fn rescaling_never_touches_native_state() {
        let (mut runs, geometry) = sample_runs(PageGeometry::new(612.0, 792.0, 1.0));
        let before: Vec<_> = runs
            .iter()
            .map(|r| (r.native_position(), r.native_font_size()))
            .collect();
        let first_viewport = runs[1].viewport_position();

        for scale in [2.0, 0.5, 1.25, 1.0] {
            remap(&mut runs, &geometry.with_scale(scale));
        }

        let after: Vec<_> = runs
            .iter()
            .map(|r| (r.native_position(), r.native_font_size()))
            .collect();
        assert_eq!(before, after);
        assert_eq!(runs[1].viewport_position(), first_viewport);
    }

    #[test]
    fn viewport_scales_linearly_with_zoom() {
        let (mut runs, geometry) = sample_runs(PageGeometry::new(612.0, 792.0, 1.0));
        let base = runs[1].viewport_position();
        remap(&mut runs, &geometry.with_scale(2.0));
        let zoomed = runs[1].viewport_position();
        assert!((zoomed.x - base.x * 2.0).abs() < 1e-3);
        assert!((zoomed.y - base.y * 2.0).abs() < 1e-3);
        assert!((runs[1].viewport_font_size() - 22.0).abs() < 1e-4);
    }

    #[test]
    fn offset_page_box_maps_from_its_own_corner() {
        let geometry = PageGeometry::new(612.0, 792.0, 2.0).with_origin(NativePoint::new(20.0, 20.0));
        let records = vec![TextRecord::new(
            "Corner",
            Transform::new(12.0, 0.0, 0.0, 12.0, 20.0, 800.0),
            40.0,
            12.0,
        )];
        let extraction = extract_runs(records, geometry, &RunStyle::default());
        assert_eq!(extraction.geometry.top_inset, 0.0);
        let run = &extraction.runs[0];
        assert_eq!(run.viewport_position(), ViewportPoint::new(0.0, 0.0));

        let back = extraction.geometry.to_native(run.viewport_position(), run.native_height());
        assert_eq!(back, run.native_position());
    }

    #[test]
    fn empty_page_has_no_inset() {
        assert_eq!(top_inset(792.0, &[]), 0.0);
    }
}
