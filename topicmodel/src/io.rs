//Copyright 2024 Felix Engl
//
//Licensed under the Apache License, Version 2.0 (the "License");
//you may not use this file except in compliance with the License.
//You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
//Unless required by applicable law or agreed to in writing, software
//distributed under the License is distributed on an "AS IS" BASIS,
//WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//See the License for the specific language governing permissions and
//limitations under the License.

use std::fs::File;
use std::io;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use flate2::Compression;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use crate::config::TrainingConfig;
use crate::corpus::Corpus;
use crate::dispersion::DispersionWeights;
use crate::enums::SnapshotError;
use crate::stats::{AlphaHistograms, SufficientStatistics};

pub const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_MAGIC: &[u8; 4] = b"WLDA";

/// The complete state of a training run, restoring it continues the run exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSnapshot {
    pub config: TrainingConfig,
    pub corpus: Corpus,
    pub statistics: SufficientStatistics,
    pub histograms: AlphaHistograms,
    pub dispersion: Option<DispersionWeights>,
    pub held_out: Option<Corpus>,
    pub iteration: usize,
    pub base_seed: u64,
}

impl TrainingSnapshot {
    /// Writes the header followed by the bincode payload, optionally deflated.
    pub fn to_writer(&self, mut writer: impl Write, deflate: bool) -> Result<(), SnapshotError> {
        writer.write_all(SNAPSHOT_MAGIC)?;
        writer.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        writer.write_all(&[deflate as u8])?;
        if deflate {
            let mut encoder = flate2::write::DeflateEncoder::new(BufWriter::new(writer), Compression::default());
            bincode::serialize_into(&mut encoder, self)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(writer);
            bincode::serialize_into(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self, SnapshotError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| SnapshotError::MissingHeader)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::MissingHeader)
        }
        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion { found: version, supported: SNAPSHOT_VERSION })
        }
        let mut deflate = [0u8; 1];
        reader.read_exact(&mut deflate)?;
        let snapshot = match deflate[0] {
            0 => bincode::deserialize_from(BufReader::new(reader))?,
            1 => bincode::deserialize_from(flate2::read::DeflateDecoder::new(BufReader::new(reader)))?,
            _ => return Err(SnapshotError::MissingHeader)
        };
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>, deflate: bool) -> Result<(), SnapshotError> {
        let file = File::options().write(true).create(true).truncate(true).open(path)?;
        self.to_writer(file, deflate)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        Self::from_reader(File::options().read(true).open(path)?)
    }
}

/// Writes one line per token: `doc source pos type topic`, preceded by the hyperparameters.
pub fn write_state(corpus: &Corpus, stats: &SufficientStatistics, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "#doc source pos type topic")?;
    writeln!(out, "#alpha : {}", stats.alphas().iter().join(" "))?;
    writeln!(out, "#beta : {}", stats.beta())?;
    for (document, doc) in corpus.iter().enumerate() {
        let source = doc.source().unwrap_or("NA");
        for (position, (word, topic)) in doc.tokens().iter().zip_eq(doc.topics()).enumerate() {
            writeln!(out, "{document} {source} {position} {word} {topic}")?;
        }
    }
    Ok(())
}

/// Writes the state dump to `path`, gzip compressed if `compress` is set.
pub fn save_state(corpus: &Corpus, stats: &SufficientStatistics, path: impl AsRef<Path>, compress: bool) -> Result<(), SnapshotError> {
    let file = File::options().write(true).create(true).truncate(true).open(path)?;
    if compress {
        let mut encoder = flate2::write::GzEncoder::new(BufWriter::new(file), Compression::default());
        write_state(corpus, stats, &mut encoder)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        write_state(corpus, stats, &mut writer)?;
        writer.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Read};
    use crate::config::TrainingConfig;
    use crate::corpus::{Corpus, Document};
    use crate::enums::SnapshotError;
    use crate::io::{save_state, write_state, TrainingSnapshot, SNAPSHOT_VERSION};
    use crate::stats::{AlphaHistograms, SufficientStatistics};

    fn snapshot() -> TrainingSnapshot {
        let corpus = Corpus::new(vec![
            Document::new(vec![0, 1, 1]).with_topics(vec![1, 0, 1]).with_source("a.txt"),
            Document::new(vec![2]).with_topics(vec![0]),
        ], 3).unwrap();
        let statistics = SufficientStatistics::from_corpus(&corpus, 2, vec![0.3, 0.7], 0.01).unwrap();
        TrainingSnapshot {
            config: TrainingConfig::builder().num_topics(2).seed(1).build().unwrap(),
            histograms: AlphaHistograms::new(2, corpus.max_document_length()),
            corpus,
            statistics,
            dispersion: None,
            held_out: None,
            iteration: 17,
            base_seed: 1,
        }
    }

    #[test]
    fn snapshot_round_trip(){
        let snapshot = snapshot();
        for deflate in [false, true] {
            let mut buffer = Vec::new();
            snapshot.to_writer(&mut buffer, deflate).unwrap();
            assert_eq!(snapshot, TrainingSnapshot::from_reader(Cursor::new(buffer)).unwrap());
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.wlda");
        snapshot.save(&path, true).unwrap();
        assert_eq!(snapshot, TrainingSnapshot::load(&path).unwrap());
    }

    #[test]
    fn rejects_foreign_files(){
        assert!(matches!(
            TrainingSnapshot::from_reader(Cursor::new(b"PK\x03\x04 something".to_vec())),
            Err(SnapshotError::MissingHeader)
        ));
        let mut buffer = b"WLDA".to_vec();
        buffer.extend_from_slice(&(SNAPSHOT_VERSION + 1).to_le_bytes());
        buffer.push(0);
        assert!(matches!(
            TrainingSnapshot::from_reader(Cursor::new(buffer)),
            Err(SnapshotError::UnsupportedVersion { supported: SNAPSHOT_VERSION, .. })
        ));
    }

    #[test]
    fn state_dump(){
        let snapshot = snapshot();
        let mut out = Vec::new();
        write_state(&snapshot.corpus, &snapshot.statistics, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!("#alpha : 0.3 0.7", lines[1]);
        assert_eq!("0 a.txt 0 0 1", lines[3]);
        assert_eq!("1 NA 0 2 0", lines[6]);
        assert_eq!(7, lines.len());

        let file = tempfile::NamedTempFile::new().unwrap();
        save_state(&snapshot.corpus, &snapshot.statistics, file.path(), true).unwrap();
        let mut decoded = String::new();
        flate2::read::GzDecoder::new(std::fs::File::open(file.path()).unwrap()).read_to_string(&mut decoded).unwrap();
        assert_eq!(text, decoded);
    }
}
