//! Table rendering for listings printed on stdout.

use crate::catalog::ArchiveSetSummary;
use crate::runtime::Volume;
use crate::utils::format::format_bytes;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct VolumeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DRIVER")]
    driver: String,
    #[tabled(rename = "MOUNTPOINT")]
    mountpoint: String,
}

#[derive(Tabled)]
struct ArchiveSetRow {
    #[tabled(rename = "BACKUP")]
    name: String,
    #[tabled(rename = "FILES")]
    files: usize,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "LOCATION")]
    location: String,
}

pub fn volumes_table(volumes: &[Volume]) -> String {
    let rows = volumes.iter().map(|v| VolumeRow {
        name: v.name.clone(),
        driver: v.driver.clone(),
        mountpoint: v.mountpoint.clone(),
    });
    Table::new(rows).with(Style::blank()).to_string()
}

pub fn archive_sets_table(sets: &[ArchiveSetSummary]) -> String {
    let rows = sets.iter().map(|s| ArchiveSetRow {
        name: s.name.clone(),
        files: s.file_count,
        size: format_bytes(s.total_bytes),
        location: s.path.display().to_string(),
    });
    Table::new(rows).with(Style::blank()).to_string()
}
