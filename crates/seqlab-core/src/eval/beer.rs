//! # BEER Evaluator
//!
//! Runs an external BEER scorer (<http://aclweb.org/anthology/D14-1025>)
//! on temporary reference and hypothesis files. Any failure is logged and
//! reported as a score of 0.0, which callers must read as "could not
//! evaluate".

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::eval::Evaluator;

/// Wrapper around the BEER executable.
#[derive(Debug, Clone)]
pub struct BeerWrapper {
    wrapper: PathBuf,
    name: String,
}

impl BeerWrapper {
    /// Create a wrapper for the executable at `wrapper`.
    pub fn new(wrapper: impl Into<PathBuf>) -> Self {
        Self {
            wrapper: wrapper.into(),
            name: "BEER".to_string(),
        }
    }

    /// Override the metric name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn wrapper(&self) -> &Path {
        &self.wrapper
    }

    /// One sentence per line, tokens joined by spaces, trailing newline.
    pub fn serialize_to_bytes(sentences: &[Vec<String>]) -> Vec<u8> {
        let mut out = String::new();
        for sentence in sentences {
            out.push_str(&sentence.join(" "));
            out.push('\n');
        }
        out.into_bytes()
    }

    fn write_temp(sentences: &[Vec<String>]) -> std::io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&Self::serialize_to_bytes(sentences))?;
        file.flush()?;
        Ok(file)
    }

    /// Run the scorer and return its stdout. Temp files are removed on drop.
    fn run(&self, hypotheses: &[Vec<String>], references: &[Vec<String>]) -> std::io::Result<String> {
        let ref_file = Self::write_temp(references)?;
        let hyp_file = Self::write_temp(hypotheses)?;

        let output = Command::new(&self.wrapper)
            .arg("-r")
            .arg(ref_file.path())
            .arg("-s")
            .arg(hyp_file.path())
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            warn!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "BEER wrapper exited unsuccessfully"
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Parse the last token of the first stdout line as the score.
    pub fn parse_score(stdout: &str) -> f32 {
        let Some(first) = stdout.lines().next() else {
            warn!("BEER wrapper produced no output");
            return 0.0;
        };

        let Some(token) = first.split_whitespace().last() else {
            error!(output = stdout, "malformed output from BEER wrapper");
            return 0.0;
        };

        match token.parse::<f32>() {
            Ok(score) => score,
            Err(_) => {
                error!(line = first, "BEER score {token:?} is not a number");
                0.0
            }
        }
    }
}

impl Evaluator for BeerWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_batch(&self, hypotheses: &[Vec<String>], references: &[Vec<String>]) -> f32 {
        if hypotheses.len() != references.len() {
            warn!(
                hypotheses = hypotheses.len(),
                references = references.len(),
                "hypothesis and reference counts differ"
            );
            return 0.0;
        }

        match self.run(hypotheses, references) {
            Ok(stdout) => {
                debug!(wrapper = %self.wrapper.display(), "BEER finished");
                Self::parse_score(&stdout)
            }
            Err(e) => {
                error!(wrapper = %self.wrapper.display(), "failed to run BEER wrapper: {e}");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(lines: &[&str]) -> Vec<Vec<String>> {
        lines
            .iter()
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn serializes_one_sentence_per_line() {
        let bytes = BeerWrapper::serialize_to_bytes(&sentences(&["a b c", "d"]));
        assert_eq!(bytes, b"a b c\nd\n");
    }

    #[test]
    fn parses_last_token_of_first_line() {
        assert_eq!(BeerWrapper::parse_score("total BEER 0.4321\nextra 9\n"), 0.4321);
    }

    #[test]
    fn malformed_output_scores_zero() {
        assert_eq!(BeerWrapper::parse_score(""), 0.0);
        assert_eq!(BeerWrapper::parse_score("\n"), 0.0);
        assert_eq!(BeerWrapper::parse_score("   \nBEER 0.9"), 0.0);
        assert_eq!(BeerWrapper::parse_score("BEER failed"), 0.0);
    }

    #[test]
    fn name_defaults_to_beer() {
        let beer = BeerWrapper::new("/opt/beer/beer_wrapper");
        assert_eq!(beer.name(), "BEER");
        assert_eq!(beer.wrapper(), Path::new("/opt/beer/beer_wrapper"));

        let renamed = beer.with_name("BEER-2.0");
        assert_eq!(renamed.name(), "BEER-2.0");
    }

    #[test]
    fn missing_executable_scores_zero() {
        let beer = BeerWrapper::new("/nonexistent/beer-wrapper");
        let s = sentences(&["a b"]);
        assert_eq!(beer.score_batch(&s, &s), 0.0);
    }

    #[test]
    fn mismatched_batches_score_zero() {
        let beer = BeerWrapper::new("/nonexistent/beer-wrapper");
        assert_eq!(beer.score_batch(&sentences(&["a", "b"]), &sentences(&["a"])), 0.0);
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("beer.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn passes_files_and_cleans_them_up() {
            let dir = tempfile::tempdir().unwrap();
            let args = dir.path().join("args");
            let body = format!(
                "printf '%s\\n%s\\n' \"$2\" \"$4\" > {args}\nhead -n1 \"$4\"",
                args = args.display()
            );
            let beer = BeerWrapper::new(script(dir.path(), &body));

            let score = beer.score_batch(
                &sentences(&["score 0.75", "ignored line"]),
                &sentences(&["ref one", "ref two"]),
            );
            assert_eq!(score, 0.75);

            let recorded = std::fs::read_to_string(&args).unwrap();
            let paths: Vec<&str> = recorded.lines().collect();
            assert_eq!(paths.len(), 2);
            for path in paths {
                assert!(!Path::new(path).exists(), "{path} was not removed");
            }
        }

        #[test]
        fn non_numeric_output_scores_zero() {
            let dir = tempfile::tempdir().unwrap();
            let beer = BeerWrapper::new(script(dir.path(), "echo 'BEER n/a'"));
            let s = sentences(&["a"]);
            assert_eq!(beer.score_batch(&s, &s), 0.0);
        }

        #[test]
        fn silent_scorer_scores_zero() {
            let dir = tempfile::tempdir().unwrap();
            let beer = BeerWrapper::new(script(dir.path(), "exit 1"));
            let s = sentences(&["a"]);
            assert_eq!(beer.score_batch(&s, &s), 0.0);
        }
    }
}
