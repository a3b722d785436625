//! Append-only CSV logs of evaluated individuals.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use csv::Writer;
use log::{debug, info, warn};

use crate::schema::{Individual, OverallStatistics, StrategyStatistics};

/// CSV log of individuals. The file is created on the first write.
///
/// The header's strategy columns are fixed by the first individual
/// written; later rows are padded or truncated to match.
pub struct IndividualLog {
    path: PathBuf,
    writer: Option<Writer<File>>,
    strategies: usize,
}

impl IndividualLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            strategies: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one individual, writing the header first if needed.
    pub fn log_individual(&mut self, individual: &Individual) -> io::Result<()> {
        let writer = match &mut self.writer {
            Some(writer) => writer,
            None => {
                self.strategies = strategy_count(individual);
                let mut writer = create(&self.path)?;
                writer.write_record(header(self.strategies))?;
                self.writer.insert(writer)
            }
        };
        writer.write_record(row(individual, self.strategies))?;
        writer.flush()
    }

    /// Replace the file's contents with a batch of individuals.
    pub fn log_individuals(&mut self, individuals: &[Individual]) -> io::Result<()> {
        let Some(first) = individuals.first() else {
            return Ok(());
        };

        self.strategies = strategy_count(first);
        let mut writer = create(&self.path)?;
        writer.write_record(header(self.strategies))?;
        for individual in individuals {
            writer.write_record(row(individual, self.strategies))?;
        }
        writer.flush()?;
        self.writer = Some(writer);
        Ok(())
    }
}

fn create(path: &Path) -> io::Result<Writer<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Writer::from_path(path)?)
}

fn strategy_count(individual: &Individual) -> usize {
    individual
        .phenotype
        .as_ref()
        .map_or(0, |p| p.strategies.len())
}

fn header(strategies: usize) -> Vec<String> {
    let mut labels: Vec<String> = vec!["Individual".into(), "Parent".into()];
    labels.extend(OverallStatistics::NAMES.iter().map(|s| s.to_string()));

    for i in 0..strategies {
        labels.extend(
            StrategyStatistics::NAMES
                .iter()
                .map(|name| format!("S{i}:{name}")),
        );
    }

    labels.push("Deck".into());
    labels
}

fn row(individual: &Individual, strategies: usize) -> Vec<String> {
    let mut data = vec![format_id(individual.id), format_id(individual.parent_id)];

    let default_stats = OverallStatistics::default();
    let (overall, reported) = match &individual.phenotype {
        Some(p) => (&p.overall, p.strategies.as_slice()),
        None => (&default_stats, &[][..]),
    };
    if !reported.is_empty() && reported.len() != strategies {
        warn!(
            "Individual {} has {} strategy results, log expects {strategies}",
            format_id(individual.id),
            reported.len()
        );
    }

    data.extend(overall.values().iter().map(f64::to_string));
    let missing = StrategyStatistics::default();
    for i in 0..strategies {
        let strategy = reported.get(i).unwrap_or(&missing);
        data.extend(strategy.values().iter().map(f64::to_string));
    }

    data.push(individual.deck.to_string());
    data
}

fn format_id(id: Option<u64>) -> String {
    id.map_or_else(|| "-1".to_string(), |id| id.to_string())
}

/// The coordinator's per-evaluation logs: every individual, new win-count
/// champions, and new fittest individuals.
pub struct SearchLogs {
    individuals: IndividualLog,
    champions: IndividualLog,
    fittest: IndividualLog,
    max_wins: f64,
    max_fitness: f64,
}

impl SearchLogs {
    /// Logs written under `log_dir`.
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        let dir = log_dir.as_ref();
        Self {
            individuals: IndividualLog::new(dir.join("individual_log.csv")),
            champions: IndividualLog::new(dir.join("champion_log.csv")),
            fittest: IndividualLog::new(dir.join("fittest_log.csv")),
            max_wins: 0.0,
            max_fitness: f64::from(i32::MIN),
        }
    }

    /// Record one evaluated individual.
    pub fn record(&mut self, individual: &Individual) -> io::Result<()> {
        let (wins, fitness) = individual
            .phenotype
            .as_ref()
            .map_or((0.0, f64::NEG_INFINITY), |p| (p.overall.win_count, p.fitness));

        info!(
            "Eval ({}): wins={} fitness={:.3} deck={}",
            format_id(individual.id),
            wins,
            fitness,
            individual.deck
        );
        if let Some(p) = &individual.phenotype {
            debug!("Overall statistics: {:?}", p.overall);
            for (i, s) in p.strategies.iter().enumerate() {
                debug!("Strategy {i}: wins={} alignment={}", s.win_count, s.alignment);
            }
        }

        let new_champion = wins > self.max_wins;
        let new_fittest = fitness > self.max_fitness;
        self.max_wins = self.max_wins.max(wins);
        self.max_fitness = self.max_fitness.max(fitness);

        self.individuals.log_individual(individual)?;
        if new_champion {
            self.champions.log_individual(individual)?;
        }
        if new_fittest {
            self.fittest.log_individual(individual)?;
        }
        Ok(())
    }

    pub fn max_fitness(&self) -> f64 {
        self.max_fitness
    }

    pub fn max_wins(&self) -> f64 {
        self.max_wins
    }
}
