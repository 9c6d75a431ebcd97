//! Formats prominence records for the final report.

use crate::source::{GeoPos, Source};
use crate::sweep::ProminenceRecord;

/// Formats one position as `12.0376°N    3.8752°W  678m`.
pub fn loc_string(pos: GeoPos) -> String {
    let (lat_mag, lat_hemi) = if pos.lat >= 0.0 { (pos.lat, 'N') } else { (-pos.lat, 'S') };
    let (lon_mag, lon_hemi) = if pos.lon >= 0.0 { (pos.lon, 'E') } else { (-pos.lon, 'W') };
    format!("{lat_mag:8.4}°{lat_hemi} {lon_mag:8.4}°{lon_hemi} {:4.0}m", pos.meters)
}

/// Formats one prominence record as a single report line, or `None` if
/// its prominence falls below `min_meters`.
pub fn format_record(source: &dyn Source, record: &ProminenceRecord, sea_level: i16, min_meters: f64) -> Option<String> {
    let prom = record.prominence(sea_level) as f64;
    if prom < min_meters {
        return None;
    }
    let peak_pos = source.pos(record.peak);
    if record.is_island {
        Some(format!("prominence of {} is {:4.0}m (to sea level)", loc_string(peak_pos), prom))
    } else {
        let col = record.col.expect("non-island record always has a col");
        let dom = record.dom.expect("non-island record always has a dominator");
        Some(format!(
            "prominence of {} is {:4.0}m (key col {} to {})",
            loc_string(peak_pos),
            prom,
            loc_string(source.pos(col)),
            loc_string(source.pos(dom)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::source::SimpleDataSet;

    #[test]
    fn loc_string_picks_hemispheres() {
        let s = loc_string(GeoPos { lat: 12.0376, lon: -3.8752, meters: 678.0 });
        assert!(s.contains('N'));
        assert!(s.contains('W'));
        assert!(s.contains("678m"));
    }

    #[test]
    fn island_record_omits_col_and_dom() {
        let source = SimpleDataSet::toy_island();
        let record = ProminenceRecord {
            peak: Cell::new(1, 1, 8),
            col: None,
            dom: None,
            is_island: true,
        };
        let line = format_record(&source, &record, 0, 0.0).unwrap();
        assert!(line.contains("sea level"));
    }

    #[test]
    fn merge_record_includes_col_and_dominator() {
        let source = SimpleDataSet::toy_island();
        let record = ProminenceRecord {
            peak: Cell::new(0, 2, 7),
            col: Some(Cell::new(0, 1, 6)),
            dom: Some(Cell::new(1, 1, 8)),
            is_island: false,
        };
        let line = format_record(&source, &record, 0, 0.0).unwrap();
        assert!(line.contains("key col"));
    }

    #[test]
    fn below_threshold_is_suppressed() {
        let source = SimpleDataSet::toy_island();
        let record = ProminenceRecord {
            peak: Cell::new(0, 2, 7),
            col: Some(Cell::new(0, 1, 6)),
            dom: Some(Cell::new(1, 1, 8)),
            is_island: false,
        };
        assert!(format_record(&source, &record, 0, 100.0).is_none());
    }
}
