//! Plain-text weight persistence.
//!
//! One file per template, `<template-name>.weights`, one
//! `feature<TAB>weight` pair per line sorted by feature name. Weights are
//! written with Rust's shortest round-trip float formatting, so a save/load
//! cycle reproduces every value exactly.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ModelError;
use crate::model::Model;
use crate::vector::Vector;

/// File extension of a template weights file.
pub const WEIGHTS_EXTENSION: &str = "weights";

/// Path of the weights file for `template` inside `dir`.
pub fn weights_path(dir: &Path, template: &str) -> PathBuf {
    dir.join(format!("{template}.{WEIGHTS_EXTENSION}"))
}

/// Write `vector` in the weights format.
pub fn write_weights<W: Write>(mut out: W, vector: &Vector) -> Result<(), ModelError> {
    for (feature, weight) in vector.sorted() {
        if feature.contains(|c: char| matches!(c, '\t' | '\n' | '\r')) {
            return Err(ModelError::InvalidFeatureName(feature.to_string()));
        }
        writeln!(out, "{feature}\t{weight}")?;
    }
    out.flush()?;
    Ok(())
}

/// Parse the weights format. Blank lines are skipped; `path` is only used for
/// error messages.
pub fn read_weights<R: BufRead>(input: R, path: &Path) -> Result<Vector, ModelError> {
    let mut vector = Vector::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let malformed = |reason: String| ModelError::MalformedWeights {
            path: path.to_path_buf(),
            line: i + 1,
            reason,
        };
        let (feature, weight) = line
            .split_once('\t')
            .ok_or_else(|| malformed("expected `feature<TAB>weight`".to_string()))?;
        let weight: f64 = weight
            .trim_end()
            .parse()
            .map_err(|e| malformed(format!("bad weight {weight:?}: {e}")))?;
        vector.set(feature, weight);
    }
    Ok(vector)
}

/// Save one vector to `path`.
pub fn save_vector(path: &Path, vector: &Vector) -> Result<(), ModelError> {
    let file = fs::File::create(path)?;
    write_weights(BufWriter::new(file), vector)
}

/// Load one vector from `path`.
pub fn load_vector(path: &Path) -> Result<Vector, ModelError> {
    let file = fs::File::open(path)?;
    read_weights(BufReader::new(file), path)
}

impl<I, C> Model<I, C> {
    /// Write every template's weights into `dir`, creating it if needed.
    /// Returns the number of files written.
    pub fn save_weights(&self, dir: &Path) -> Result<usize, ModelError> {
        fs::create_dir_all(dir)?;
        for template in self.templates() {
            let path = weights_path(dir, template.id().as_str());
            save_vector(&path, &template.weights().snapshot())?;
        }
        tracing::info!(dir = %dir.display(), templates = self.len(), "Saved template weights");
        Ok(self.len())
    }

    /// Load weights from `dir` into the registered templates.
    ///
    /// A weights file for a template that is not registered fails with
    /// [`ModelError::UnknownTemplate`]. Registered templates without a file
    /// keep their current weights. Every file is parsed before any template
    /// is touched, so a failed load leaves the model unchanged. Returns the
    /// number of templates loaded.
    pub fn load_weights(&self, dir: &Path) -> Result<usize, ModelError> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == WEIGHTS_EXTENSION))
            .collect();
        entries.sort();

        let mut staged = Vec::with_capacity(entries.len());
        for path in entries {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| ModelError::UnknownTemplate(path.display().to_string()))?;
            let template = self.template(name)?;
            staged.push((template, load_vector(&path)?));
        }

        let loaded = staged.len();
        for (template, vector) in staged {
            template.weights().replace(vector);
        }
        if loaded < self.len() {
            tracing::warn!(
                dir = %dir.display(),
                loaded,
                registered = self.len(),
                "Some templates had no weights file; keeping their current weights"
            );
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_exact() {
        let v = Vector::from_pairs([
            ("tok=the&tag=O", 0.1 + 0.2),
            ("bias", -1.0e-300),
            ("big", 6.02214076e23),
            ("third", 1.0 / 3.0),
            ("neg_zero", -0.0),
        ]);
        let mut buf = Vec::new();
        write_weights(&mut buf, &v).unwrap();
        let back = read_weights(buf.as_slice(), Path::new("mem")).unwrap();
        assert_eq!(back.len(), v.len());
        for (k, x) in v.iter() {
            assert_eq!(back.get(k).to_bits(), x.to_bits(), "feature {k}");
        }
    }

    #[test]
    fn test_lines_sorted() {
        let v = Vector::from_pairs([("b", 2.0), ("a", 1.0)]);
        let mut buf = Vec::new();
        write_weights(&mut buf, &v).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a\t1\nb\t2\n");
    }

    #[test]
    fn test_feature_with_spaces_survives() {
        let v = Vector::from_pairs([("word=New York", 0.5)]);
        let mut buf = Vec::new();
        write_weights(&mut buf, &v).unwrap();
        let back = read_weights(buf.as_slice(), Path::new("mem")).unwrap();
        assert_eq!(back.get("word=New York"), 0.5);
    }

    #[test]
    fn test_tab_in_feature_rejected() {
        let v = Vector::from_pairs([("bad\tname", 1.0)]);
        let err = write_weights(Vec::new(), &v).unwrap_err();
        assert!(matches!(err, ModelError::InvalidFeatureName(_)));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let input = "a\t1\n\nno-tab-here\n";
        match read_weights(input.as_bytes(), Path::new("w.weights")) {
            Err(ModelError::MalformedWeights { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected MalformedWeights, got {other:?}"),
        }
        let input = "a\tnot-a-number\n";
        assert!(matches!(
            read_weights(input.as_bytes(), Path::new("w.weights")),
            Err(ModelError::MalformedWeights { line: 1, .. })
        ));
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = weights_path(dir.path(), "emission");
        assert!(path.ends_with("emission.weights"));
        let v = Vector::from_pairs([("x", 1.5), ("y", -2.25)]);
        save_vector(&path, &v).unwrap();
        assert_eq!(load_vector(&path).unwrap(), v);
    }
}
