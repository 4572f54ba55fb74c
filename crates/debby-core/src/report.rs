//! Rendering of a check report for whoever gets notified.
//!
//! Delivery (mail, chat, ...) is left to the caller: notifiers only write the
//! rendered report to an `io::Write`.

use std::io::{self, Write};

use crate::orchestration::{CheckReport, UpdatableEntry};

const SHORT_REFERENCE_LEN: usize = 7;

pub trait Notifier {
    fn notify(&mut self, report: &CheckReport) -> io::Result<()>;
}

/// Plain text report, one line per updatable package grouped by manager.
pub struct TextNotifier<W: Write> {
    writer: W,
}

impl<W: Write> TextNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_entry(&mut self, entry: &UpdatableEntry) -> io::Result<()> {
        let (installed, latest) = if entry.is_by_reference() {
            (
                short_reference(entry.installed()),
                short_reference(&entry.updatable_version),
            )
        } else {
            (entry.installed(), entry.updatable_version.as_str())
        };

        write!(self.writer, "  - {}: {installed} -> {latest}", entry.package)?;
        if let Some(required) = &entry.required_version {
            write!(self.writer, " (requires {required})")?;
        }
        writeln!(self.writer)
    }
}

impl<W: Write> Notifier for TextNotifier<W> {
    fn notify(&mut self, report: &CheckReport) -> io::Result<()> {
        for summary in &report.summaries {
            writeln!(
                self.writer,
                "{}: {} of {} required packages can be updated",
                summary.manager.as_str(),
                summary.updatable,
                summary.checked
            )?;
            for entry in report
                .entries
                .iter()
                .filter(|entry| entry.manager == summary.manager)
            {
                self.write_entry(entry)?;
            }
        }

        if report.has_failures() {
            writeln!(self.writer, "failed checks:")?;
            for failure in &report.failures {
                writeln!(
                    self.writer,
                    "  - {}: {:?}: {}",
                    failure.manager.as_str(),
                    failure.kind,
                    failure.message
                )?;
            }
        }

        self.writer.flush()
    }
}

pub struct JsonNotifier<W: Write> {
    writer: W,
}

impl<W: Write> JsonNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Notifier for JsonNotifier<W> {
    fn notify(&mut self, report: &CheckReport) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, report)?;
        writeln!(self.writer)?;
        self.writer.flush()
    }
}

fn short_reference(reference: &str) -> &str {
    reference.get(..SHORT_REFERENCE_LEN).unwrap_or(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoreErrorKind, ManagerId};
    use crate::orchestration::{ManagerFailure, ManagerSummary};

    fn report() -> CheckReport {
        CheckReport {
            entries: vec![
                UpdatableEntry {
                    manager: ManagerId::Composer,
                    package: "monolog/monolog".to_string(),
                    required_version: Some("^3.0".to_string()),
                    installed_version: Some("3.4.0".to_string()),
                    installed_reference: None,
                    updatable_version: "3.5.0".to_string(),
                },
                UpdatableEntry {
                    manager: ManagerId::Composer,
                    package: "acme/toolkit".to_string(),
                    required_version: Some("dev-main".to_string()),
                    installed_version: Some("dev-main".to_string()),
                    installed_reference: Some(
                        "1f2e3d4c5b6a79880123456789abcdef01234567".to_string(),
                    ),
                    updatable_version: "9c8b7a6f5e4d3c2b1a0f9e8d7c6b5a4f3e2d1c0b".to_string(),
                },
            ],
            summaries: vec![ManagerSummary {
                manager: ManagerId::Composer,
                checked: 3,
                updatable: 2,
            }],
            failures: vec![ManagerFailure {
                manager: ManagerId::Npm,
                kind: CoreErrorKind::LockNotFound,
                message: "can not find package-lock.json in /srv/shop".to_string(),
            }],
        }
    }

    #[test]
    fn text_report_lists_updates_and_failures() {
        let mut notifier = TextNotifier::new(Vec::new());
        notifier.notify(&report()).unwrap();
        let rendered = String::from_utf8(notifier.into_inner()).unwrap();

        assert_eq!(
            rendered,
            "composer: 2 of 3 required packages can be updated\n\
             \x20 - monolog/monolog: 3.4.0 -> 3.5.0 (requires ^3.0)\n\
             \x20 - acme/toolkit: 1f2e3d4 -> 9c8b7a6 (requires dev-main)\n\
             failed checks:\n\
             \x20 - npm: LockNotFound: can not find package-lock.json in /srv/shop\n"
        );
    }

    #[test]
    fn text_report_for_fresh_project() {
        let fresh = CheckReport {
            summaries: vec![ManagerSummary {
                manager: ManagerId::Npm,
                checked: 4,
                updatable: 0,
            }],
            ..CheckReport::default()
        };
        let mut notifier = TextNotifier::new(Vec::new());
        notifier.notify(&fresh).unwrap();

        assert_eq!(
            String::from_utf8(notifier.into_inner()).unwrap(),
            "npm: 0 of 4 required packages can be updated\n"
        );
    }

    #[test]
    fn json_report_uses_snake_case_identifiers() {
        let mut notifier = JsonNotifier::new(Vec::new());
        notifier.notify(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&notifier.into_inner()).unwrap();

        assert_eq!(value["entries"][0]["manager"], "composer");
        assert_eq!(value["entries"][0]["updatable_version"], "3.5.0");
        assert_eq!(value["entries"][1]["installed_reference"].as_str().map(str::len), Some(40));
        assert_eq!(value["summaries"][0]["checked"], 3);
        assert_eq!(value["failures"][0]["kind"], "lock_not_found");
    }
}
