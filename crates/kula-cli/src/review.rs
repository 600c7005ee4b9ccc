//! Line-oriented review loop
//!
//! Reads one command per line, applies it to the shared session, and prints
//! the session's status message. Edits are collected on a draft copy of the
//! current record and handed to the session on save.

use std::io::Write;
use std::str::FromStr;

use kula_annotator::{SessionSummary, SharedSession};
use kula_core::{Record, RecordStore, Status};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const HELP: &str = "\
Commands:
  s, save                 save the current record (with edits) and move on
  k, skip                 skip the current record
  u, undo                 undo the last save or skip
  f, finish               write the output, update the source, and exit
  set <field> <value>     edit entity1, entity1_label, entity2, entity2_label or relation
  show                    show the current record again
  labels                  list suggested entity labels and relations
  q, quit                 exit without finishing";

/// One parsed line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Save,
    Skip,
    Undo,
    Finish,
    Set { field: String, value: String },
    Show,
    Labels,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        match head.to_lowercase().as_str() {
            "s" | "save" => Ok(Self::Save),
            "k" | "skip" => Ok(Self::Skip),
            "u" | "undo" => Ok(Self::Undo),
            "f" | "finish" => Ok(Self::Finish),
            "show" | "" => Ok(Self::Show),
            "labels" => Ok(Self::Labels),
            "h" | "help" | "?" => Ok(Self::Help),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            "set" => {
                let (field, value) = match rest.split_once(char::is_whitespace) {
                    Some((field, value)) => (field, value.trim()),
                    None => (rest, ""),
                };
                if field.is_empty() {
                    return Err("usage: set <field> <value>".to_string());
                }
                Ok(Self::Set {
                    field: field.to_string(),
                    value: value.to_string(),
                })
            }
            other => Err(format!("unknown command `{other}` (type `help`)")),
        }
    }
}

/// Interactive front end over a shared session
pub struct Reviewer<S: RecordStore + 'static> {
    session: SharedSession<S>,
    draft: Option<Record>,
    entity_labels: Vec<String>,
    relation_labels: Vec<String>,
}

impl<S: RecordStore + 'static> Reviewer<S> {
    pub fn new(session: SharedSession<S>) -> Self {
        Self {
            session,
            draft: None,
            entity_labels: Vec::new(),
            relation_labels: Vec::new(),
        }
    }

    /// Label suggestions shown by the `labels` command
    pub fn with_labels(
        mut self,
        entity_labels: Vec<String>,
        relation_labels: Vec<String>,
    ) -> Self {
        self.entity_labels = entity_labels;
        self.relation_labels = relation_labels;
        self
    }

    /// Run until `finish` succeeds, the user quits, or input ends
    ///
    /// Returns the summary when the session was finished.
    pub async fn run<R, W>(
        &mut self,
        mut input: R,
        out: &mut W,
    ) -> anyhow::Result<Option<SessionSummary>>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.reset_draft()?;
        self.render(out)?;

        let mut line = String::new();
        loop {
            write!(out, "> ")?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line).await? == 0 {
                self.quit(out).await?;
                return Ok(None);
            }

            let command = match line.parse::<Command>() {
                Ok(command) => command,
                Err(message) => {
                    writeln!(out, "{}", Status::warning(message))?;
                    continue;
                }
            };

            match command {
                Command::Save => {
                    let edits = match self.draft.clone() {
                        Some(draft) => draft,
                        None => {
                            writeln!(out, "{}", Status::warning("No more sentences to edit"))?;
                            continue;
                        }
                    };
                    let result = self.session.save_async(edits).await;
                    self.report(result, out)?;
                }
                Command::Skip => {
                    let result = self.session.skip_async().await;
                    self.report(result, out)?;
                }
                Command::Undo => {
                    let result = self.session.undo_async().await;
                    self.report(result, out)?;
                }
                Command::Finish => match self.session.finish_async().await {
                    Ok(summary) => {
                        writeln!(out, "{}", Status::info(format!("Summary: {summary}")))?;
                        return Ok(Some(summary));
                    }
                    Err(e) if e.is_recoverable() => writeln!(out, "{}", Status::from(&e))?,
                    Err(e) => return Err(e.into()),
                },
                Command::Set { field, value } => self.edit(&field, value, out)?,
                Command::Show => self.render(out)?,
                Command::Labels => {
                    writeln!(out, "Entity labels: {}", self.entity_labels.join(", "))?;
                    writeln!(out, "Relations:     {}", self.relation_labels.join(", "))?;
                }
                Command::Help => writeln!(out, "{HELP}")?,
                Command::Quit => {
                    self.quit(out).await?;
                    return Ok(None);
                }
            }
        }
    }

    fn report<W: Write>(
        &mut self,
        result: kula_core::Result<Status>,
        out: &mut W,
    ) -> anyhow::Result<()> {
        match result {
            Ok(status) => {
                writeln!(out, "{status}")?;
                self.reset_draft()?;
                self.render(out)
            }
            Err(e) if e.is_recoverable() => {
                writeln!(out, "{}", Status::from(&e))?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn edit<W: Write>(&mut self, field: &str, value: String, out: &mut W) -> anyhow::Result<()> {
        if field == "sentence" {
            writeln!(out, "{}", Status::warning("The sentence cannot be edited"))?;
            return Ok(());
        }
        let Some(draft) = self.draft.as_ref() else {
            writeln!(out, "{}", Status::warning("No more sentences to edit"))?;
            return Ok(());
        };
        match draft.with_field(field, value) {
            Some(next) => {
                self.draft = Some(next);
                self.render(out)
            }
            None => {
                writeln!(out, "{}", Status::warning(format!("Unknown field `{field}`")))?;
                Ok(())
            }
        }
    }

    fn reset_draft(&mut self) -> anyhow::Result<()> {
        self.draft = self.session.current()?;
        Ok(())
    }

    fn render<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        let (cursor, total) = self.session.position()?;
        match &self.draft {
            Some(record) => {
                writeln!(out, "Sentence {} of {}", cursor + 1, total)?;
                writeln!(out, "  {}", record.sentence)?;
                writeln!(out, "  entity1:  {} [{}]", record.entity1, record.entity1_label)?;
                writeln!(out, "  entity2:  {} [{}]", record.entity2, record.entity2_label)?;
                writeln!(out, "  relation: {}", record.relation)?;
            }
            None => writeln!(out, "No more sentences to edit ({total} reviewed); type `finish`")?,
        }
        Ok(())
    }

    async fn quit<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        // Keep saved edits on disk even when the session is not finished
        let flushed = self
            .session
            .run_blocking(|s| if s.is_dirty() { s.flush().map(Some) } else { Ok(None) })
            .await;
        match flushed {
            Ok(Some(status)) => writeln!(out, "{status}")?,
            Ok(None) => {}
            Err(e) => writeln!(out, "{}", Status::from(&e))?,
        }
        let summary = self.session.summary()?;
        writeln!(
            out,
            "{}",
            Status::warning(format!("Left without finishing: {summary}"))
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kula_annotator::AnnotationSession;
    use kula_core::Table;
    use kula_store::MemoryRecordStore;

    #[test]
    fn test_parse_commands() {
        assert_eq!("s".parse::<Command>().unwrap(), Command::Save);
        assert_eq!(" SKIP ".parse::<Command>().unwrap(), Command::Skip);
        assert_eq!("".parse::<Command>().unwrap(), Command::Show);
        assert_eq!(
            "set relation works for".parse::<Command>().unwrap(),
            Command::Set {
                field: "relation".to_string(),
                value: "works for".to_string()
            }
        );
        assert_eq!(
            "set entity2".parse::<Command>().unwrap(),
            Command::Set {
                field: "entity2".to_string(),
                value: String::new()
            }
        );
        assert!("set".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    fn reviewer(n: usize) -> (MemoryRecordStore, Reviewer<MemoryRecordStore>) {
        let store = MemoryRecordStore::new();
        let records: Vec<Record> = (0..n)
            .map(|i| {
                Record::new(format!("Sentence number {i}")).with_entity1(format!("E{i}"), "ORG")
            })
            .collect();
        store.insert("source", Table::from_records(&records)).unwrap();

        let mut session = AnnotationSession::new(store.clone(), "output");
        session.load("source").unwrap();
        (store, Reviewer::new(SharedSession::new(session)))
    }

    #[tokio::test]
    async fn test_edit_save_finish() {
        let (store, mut reviewer) = reviewer(2);
        let input: &[u8] = b"set relation part_of\nsave\nskip\nfinish\n";
        let mut out = Vec::new();

        let summary = reviewer.run(input, &mut out).await.unwrap().unwrap();
        assert_eq!(summary.saved_count, 1);
        assert_eq!(summary.skipped_count, 1);

        let output = store.get("output").unwrap().to_records("output").unwrap();
        assert_eq!(output[0].relation, "part_of");
        assert_eq!(output[0].entity1, "E0");
        assert!(store.get("source").unwrap().is_empty());

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Sentence 1 of 2"));
        assert!(text.contains("Summary: 1 saved, 1 skipped, 0 remaining"));
    }

    #[tokio::test]
    async fn test_undo_restores_previous_record() {
        let (_store, mut reviewer) = reviewer(2);
        let input: &[u8] = b"skip\nundo\nundo\nquit\n";
        let mut out = Vec::new();

        assert!(reviewer.run(input, &mut out).await.unwrap().is_none());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Nothing to undo"));
        assert!(text.contains("Left without finishing: 0 saved, 0 skipped, 2 remaining"));
    }

    #[tokio::test]
    async fn test_quit_writes_pending_saves() {
        let store = MemoryRecordStore::new();
        store
            .insert("source", Table::from_records(&[Record::new("only")]))
            .unwrap();
        let mut session = AnnotationSession::new(store.clone(), "output").with_auto_save(false);
        session.load("source").unwrap();
        let mut reviewer = Reviewer::new(SharedSession::new(session));

        let input: &[u8] = b"save\nquit\n";
        let mut out = Vec::new();
        assert!(reviewer.run(input, &mut out).await.unwrap().is_none());

        assert_eq!(store.get("output").unwrap().num_rows(), 1);
        assert_eq!(store.get("source").unwrap().num_rows(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Wrote 1 sentences to output"));
        assert!(text.contains("Left without finishing: 1 saved, 0 skipped, 0 remaining"));
    }

    #[tokio::test]
    async fn test_bad_input_keeps_going() {
        let (_store, mut reviewer) = reviewer(1);
        let input: &[u8] = b"dance\nset sentence x\nset nope x\nskip\nskip\n";
        let mut out = Vec::new();

        assert!(reviewer.run(input, &mut out).await.unwrap().is_none());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("unknown command `dance`"));
        assert!(text.contains("The sentence cannot be edited"));
        assert!(text.contains("Unknown field `nope`"));
        assert!(text.contains("No more sentences to edit"));
    }
}
