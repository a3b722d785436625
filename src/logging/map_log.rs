//! Compressed per-update snapshots of a feature map.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use csv::{Writer, WriterBuilder};

use crate::search::FeatureMap;

const HEADER: [&str; 2] = [
    "Dimensions",
    "Map (f1xf2:CellCount:IndividualID:Wins:Fitness:Feature1:Feature2)",
];

/// One CSV row per archive update. Rows hold one field per occupied cell,
/// so their width varies.
pub struct MapLog {
    writer: Writer<File>,
}

impl MapLog {
    /// Create (truncate) the log file and write its header.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = WriterBuilder::new().flexible(true).from_path(path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Append a snapshot of `map`.
    pub fn update(&mut self, map: &FeatureMap) -> io::Result<()> {
        self.writer.write_record(snapshot(map))?;
        self.writer.flush()
    }
}

fn snapshot(map: &FeatureMap) -> Vec<String> {
    let dimensions = vec![map.num_groups().to_string(); map.num_features()].join("x");

    let mut cells = vec![dimensions];
    for (key, elite) in map.elites() {
        let mut fields = vec![
            key.to_string(),
            map.cell_count(key).to_string(),
            elite.id.map_or_else(|| "-1".to_string(), |id| id.to_string()),
        ];
        let wins = elite.phenotype.as_ref().map_or(0.0, |p| p.overall.win_count);
        fields.push(wins.to_string());
        fields.push(elite.fitness().to_string());
        fields.extend(elite.features().iter().map(f64::to_string));
        cells.push(fields.join(":"));
    }
    cells
}
