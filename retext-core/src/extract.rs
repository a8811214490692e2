use std::cmp::Ordering;

use tracing::debug;

use crate::geometry::PageGeometry;
use crate::run::{RunStyle, TextRecord, TextRun};
use crate::viewport;

#[derive(Debug, Clone)]
pub struct Extraction {
    /// Runs sorted by `order` (top of page first).
    pub runs: Vec<TextRun>,
    /// Input geometry with `top_inset` filled in from the extracted runs.
    pub geometry: PageGeometry,
}

/// Turns decoded text records into runs. Records are never filtered: blank and
/// zero-sized records become runs like any other.
pub fn extract_runs(
    records: Vec<TextRecord>,
    geometry: PageGeometry,
    defaults: &RunStyle,
) -> Extraction {
    let mut indexed: Vec<(usize, TextRecord)> = records.into_iter().enumerate().collect();
    // Stable: records on the same baseline keep content-stream order.
    indexed.sort_by(|(_, a), (_, b)| {
        b.transform
            .f
            .partial_cmp(&a.transform.f)
            .unwrap_or(Ordering::Equal)
    });

    let mut runs: Vec<TextRun> = indexed
        .into_iter()
        .enumerate()
        .map(|(order, (_, record))| TextRun::from_record(record, order as u32, defaults))
        .collect();

    let geometry = PageGeometry {
        top_inset: viewport::top_inset(geometry.page_top(), &runs),
        ..geometry
    };
    viewport::remap(&mut runs, &geometry);
    debug!(runs = runs.len(), top_inset = geometry.top_inset, "extracted text runs");

    Extraction { runs, geometry }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Rgb, Transform};

    fn record(text: &str, x: f32, y: f32, size: f32) -> TextRecord {
        TextRecord::new(text, Transform::new(size, 0.0, 0.0, size, x, y), 10.0, size)
    }

    #[test]
    fn orders_runs_top_to_bottom() {
        let records = vec![
            record("bottom", 72.0, 600.0, 12.0),
            record("top", 72.0, 700.0, 12.0),
            record("middle", 72.0, 650.0, 12.0),
        ];
        let extraction =
            extract_runs(records, PageGeometry::new(612.0, 792.0, 1.0), &RunStyle::default());
        let seen: Vec<_> = extraction
            .runs
            .iter()
            .map(|r| (r.order(), r.content().to_owned()))
            .collect();
        assert_eq!(
            seen,
            vec![
                (0, "top".to_owned()),
                (1, "middle".to_owned()),
                (2, "bottom".to_owned())
            ]
        );
        assert!(extraction.runs.iter().all(|r| !r.is_dirty()));
    }

    #[test]
    fn applies_flip_and_normalizes_top_run_to_zero() {
        let records = vec![record("a", 72.0, 700.0, 12.0), record("b", 100.0, 650.0, 10.0)];
        let extraction =
            extract_runs(records, PageGeometry::new(612.0, 792.0, 1.5), &RunStyle::default());
        let top = &extraction.runs[0];
        let next = &extraction.runs[1];

        assert_eq!(top.viewport_position().y, 0.0);
        assert!((top.viewport_position().x - 108.0).abs() < 1e-4);
        assert!((top.viewport_font_size() - 18.0).abs() < 1e-4);

        // raw viewport y: H*s - y*s - h*s, minus the top run's raw value
        let raw_top = 792.0 * 1.5 - 700.0 * 1.5 - 12.0 * 1.5;
        let raw_next = 792.0 * 1.5 - 650.0 * 1.5 - 10.0 * 1.5;
        assert!((next.viewport_position().y - (raw_next - raw_top)).abs() < 1e-3);
        assert!((extraction.geometry.top_inset - 80.0).abs() < 1e-4);
    }

    #[test]
    fn empty_page_yields_no_runs() {
        let extraction =
            extract_runs(Vec::new(), PageGeometry::new(612.0, 792.0, 1.0), &RunStyle::default());
        assert!(extraction.runs.is_empty());
        assert_eq!(extraction.geometry.top_inset, 0.0);
    }

    #[test]
    fn keeps_zero_sized_records_and_applies_defaults() {
        let mut blank = TextRecord::new(" ", Transform::translation(10.0, 10.0), 0.0, 0.0);
        blank.color = Some(Rgb::new(200, 0, 0));
        let defaults = RunStyle {
            font_family: "Courier".to_owned(),
            ..RunStyle::default()
        };
        let extraction =
            extract_runs(vec![blank], PageGeometry::new(100.0, 100.0, 1.0), &defaults);
        assert_eq!(extraction.runs.len(), 1);
        assert_eq!(extraction.runs[0].font_family(), "Courier");
        assert_eq!(extraction.runs[0].color(), Rgb::new(200, 0, 0));
    }

    #[test]
    fn run_ids_are_unique() {
        let records = (0..20)
            .map(|i| record("x", 0.0, i as f32 * 10.0, 8.0))
            .collect();
        let extraction =
            extract_runs(records, PageGeometry::new(612.0, 792.0, 1.0), &RunStyle::default());
        let mut ids: Vec<_> = extraction.runs.iter().map(|r| r.id()).collect();
        ids.sort_by_key(|id| *id.as_uuid());
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }
}
