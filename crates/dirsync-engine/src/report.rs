//! Textual run report.
//!
//! ```text
//! ------------------------------------------------------
//! LDAP Synch Report
//! ------------------------------------------------------
//!
//! Process structure
//! ----------------------
//!  ADD
//! -----
//! 	dn: ou=DS1 [ou: DS1, description: Department 1]
//! ```

use std::fmt;

use dirsync_connector::operation::{AttributeSet, EntryMap};

use crate::engine::SyncOutcome;
use crate::job::{JobReport, SpecializationReport};

const BANNER_RULE: &str = "------------------------------------------------------";
const SECTION_RULE: &str = "----------------------";
const TAG_RULE: &str = "-----";

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\n{BANNER_RULE}\nLDAP Synch Report\n{BANNER_RULE}\n\n")?;
        for specialization in &self.specializations {
            write!(f, "{specialization}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SpecializationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.outcome, &self.error) {
            (Some(outcome), _) => write!(f, "{outcome}"),
            (None, error) => {
                writeln!(f, "Process {}\n{SECTION_RULE}", self.name)?;
                writeln!(f, "Failed: {}", error.as_deref().unwrap_or("unknown error"))?;
                writeln!(f)
            }
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Process {}\n{SECTION_RULE}", self.name)?;
        if self.comparison.is_empty() {
            writeln!(f, " no synchronization was needed")?;
        } else {
            for (tag, entries) in self.comparison.groups() {
                writeln!(f, " {tag}\n{TAG_RULE}")?;
                write_entries(f, entries)?;
            }
        }

        if !self.dropped.is_empty() {
            writeln!(f, " DROPPED\n{TAG_RULE}")?;
            for entry in &self.dropped {
                writeln!(f, "\t{}: {}", entry.tag, entry.rdn)?;
            }
        }
        if let Some(apply) = &self.apply {
            for failure in &apply.failures {
                writeln!(
                    f,
                    " FAILED {} at {}: {} ({} skipped)",
                    failure.tag, failure.rdn, failure.message, failure.skipped
                )?;
            }
        }
        writeln!(f)
    }
}

fn write_entries(f: &mut fmt::Formatter<'_>, entries: &EntryMap) -> fmt::Result {
    for (rdn, attributes) in entries {
        writeln!(f, "\tdn: {} [{}]", rdn, render_attributes(attributes))?;
    }
    Ok(())
}

fn render_attributes(attributes: &AttributeSet) -> String {
    attributes
        .iter()
        .map(|(name, values)| format!("{}: {}", name, values.join(" | ")))
        .collect::<Vec<_>>()
        .join(", ")
}

impl JobReport {
    /// Report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use dirsync_connector::dn::DistinguishedName;

    use super::*;
    use crate::reconciliation::applier::{ApplyFailure, ApplyReport};
    use crate::reconciliation::differ::{ComparisonResult, DroppedEntry, EntryTag};
    use crate::reconciliation::statistics::RunStatistics;

    fn dn(value: &str) -> DistinguishedName {
        DistinguishedName::parse(value).unwrap()
    }

    fn outcome(name: &str, comparison: ComparisonResult) -> SyncOutcome {
        SyncOutcome {
            name: name.to_string(),
            comparison,
            dropped: Vec::new(),
            apply: Some(ApplyReport::default()),
            statistics: RunStatistics::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_outcome() {
        let text = outcome("structure", ComparisonResult::new()).to_string();
        assert_eq!(
            text,
            "Process structure\n----------------------\n no synchronization was needed\n\n"
        );
    }

    #[test]
    fn test_tag_sections() {
        let mut comparison = ComparisonResult::new();
        comparison.insert(
            EntryTag::Add,
            dn("ou=DS1"),
            AttributeSet::new()
                .with("ou", ["DS1"])
                .with("description", ["a", "b"]),
        );
        comparison.insert(EntryTag::Delete, dn("ou=Old"), AttributeSet::new());

        let text = outcome("structure", comparison).to_string();
        assert_eq!(
            text,
            "Process structure\n----------------------\n \
             ADD\n-----\n\tdn: ou=DS1 [ou: DS1, description: a | b]\n \
             DELETE\n-----\n\tdn: ou=Old []\n\n"
        );
    }

    #[test]
    fn test_dropped_and_failures_listed() {
        let mut o = outcome("entitlement", ComparisonResult::new());
        o.dropped.push(DroppedEntry {
            tag: EntryTag::Add,
            rdn: dn("cn=New"),
        });
        o.apply = Some(ApplyReport {
            failures: vec![ApplyFailure {
                tag: EntryTag::Modify,
                rdn: dn("cn=Broken"),
                message: "no such object".to_string(),
                skipped: 2,
            }],
            ..ApplyReport::default()
        });

        let text = o.to_string();
        assert!(text.contains(" DROPPED\n-----\n\tADD: cn=New\n"));
        assert!(text.contains(" FAILED MODIFY at cn=Broken: no such object (2 skipped)\n"));
    }

    #[test]
    fn test_job_report_banner_and_failed_section() {
        let report = JobReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            specializations: vec![
                SpecializationReport {
                    name: "structure".to_string(),
                    outcome: Some(outcome("structure", ComparisonResult::new())),
                    error: None,
                },
                SpecializationReport {
                    name: "group".to_string(),
                    outcome: None,
                    error: Some("connection refused".to_string()),
                },
            ],
            totals: RunStatistics::new(),
        };

        let text = report.to_string();
        assert!(text.starts_with(
            "\n------------------------------------------------------\nLDAP Synch Report\n------------------------------------------------------\n\nProcess structure\n"
        ));
        assert!(text.ends_with("Process group\n----------------------\nFailed: connection refused\n\n"));
        assert!(report.has_failures());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["specializations"][1]["error"], "connection refused");
    }
}
