//! Line-driven dashboard. Each command maps onto one `Session` transition
//! and at most one request.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::client::ScoringApi;
use crate::collector::Preset;
use crate::display;
use crate::error::FraudCheckError;
use crate::models::{Mode, UserDescriptor};
use crate::session::{CheckPhase, FeedbackPhase, Session};

const HELP: &str = "\
commands:
  mode banking|credit-card   switch form (clears all fields)
  set <field> <value>        edit a field, e.g. set Transaction_Amount 120.50
  preset normal|fraud        credit card sample values
  show                       print the form
  check                      score the current form
  correct                    the last verdict was right
  incorrect                  the last verdict was wrong (asks for a note)
  stats                      show or hide statistics
  whoami                     signed-in user
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Console<W: Write> {
    session: Session,
    user: UserDescriptor,
    demo: bool,
    registered_users: usize,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(session: Session, user: UserDescriptor, demo: bool, registered_users: usize, out: W) -> Self {
        Self {
            session,
            user,
            demo,
            registered_users,
            out,
        }
    }

    fn prompt(&self) -> String {
        match self.session.feedback_phase() {
            FeedbackPhase::AwaitingNote => "note> ".to_string(),
            _ => format!("{}> ", self.session.mode()),
        }
    }

    pub async fn handle_line<A: ScoringApi>(&mut self, api: &A, line: &str) -> std::io::Result<Flow> {
        let line = line.trim();

        if self.session.feedback_phase() == FeedbackPhase::AwaitingNote {
            return self.handle_note(api, line).await;
        }

        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        debug!(command, "console command");

        match command.to_ascii_lowercase().as_str() {
            "" => {}
            "help" | "?" => writeln!(self.out, "{HELP}")?,
            "quit" | "exit" => return Ok(Flow::Quit),
            "whoami" => writeln!(self.out, "{}", display::render_user(&self.user, self.demo))?,
            "mode" => match parse_mode(rest) {
                Some(mode) => {
                    self.session.switch_mode(mode);
                    writeln!(self.out, "{} form ready.", mode.label())?;
                }
                None => writeln!(self.out, "usage: mode banking|credit-card")?,
            },
            "set" => match rest.split_once(char::is_whitespace) {
                Some((field, value)) => {
                    let applied = self.session.collector_mut().set_field(field, value);
                    self.report(applied)?;
                }
                None => writeln!(self.out, "usage: set <field> <value>")?,
            },
            "preset" => {
                let preset = match rest.to_ascii_lowercase().as_str() {
                    "normal" => Some(Preset::Normal),
                    "fraud" => Some(Preset::Fraud),
                    _ => None,
                };
                match preset {
                    Some(preset) => {
                        let applied = self.session.collector_mut().apply_preset(preset);
                        self.report(applied)?;
                    }
                    None => writeln!(self.out, "usage: preset normal|fraud")?,
                }
            }
            "show" => {
                for (name, value) in self.session.collector().fields() {
                    writeln!(self.out, "{name:<28} {value}")?;
                }
                if let CheckPhase::Failed(err) = self.session.phase() {
                    writeln!(self.out, "last check failed ({}): {err}", err.kind())?;
                }
            }
            "check" => {
                writeln!(self.out, "Analyzing transaction...")?;
                let rendered = self.session.run_check(api).await.map(display::render_result);
                match rendered {
                    Ok(rendered) => write!(self.out, "{rendered}")?,
                    Err(err) => self.print_error(&err)?,
                }
            }
            "correct" => match self.session.mark_correct() {
                Ok(record) => match self.session.send_feedback(api, &record).await {
                    Ok(_) => self.feedback_accepted(api).await?,
                    Err(err) => self.print_error(&err)?,
                },
                Err(err) => self.print_error(&err)?,
            },
            "incorrect" => match self.session.mark_incorrect() {
                Ok(()) => writeln!(
                    self.out,
                    "What did the verdict get wrong? (type 'cancel' to go back)"
                )?,
                Err(err) => self.print_error(&err)?,
            },
            "stats" => {
                if self.session.toggle_stats() {
                    match api.stats().await {
                        Ok(stats) => {
                            let rendered = display::render_stats(&stats, Some(self.registered_users));
                            self.session.set_stats(stats);
                            write!(self.out, "{rendered}")?;
                        }
                        Err(err) => {
                            self.print_error(&err)?;
                            if let Some(previous) = &self.session.stats().snapshot {
                                let rendered = display::render_stats(previous, Some(self.registered_users));
                                write!(self.out, "last known statistics:\n{rendered}")?;
                            }
                        }
                    }
                } else {
                    writeln!(self.out, "Stats hidden.")?;
                }
            }
            other => writeln!(self.out, "unknown command {other:?}; try 'help'")?,
        }

        Ok(Flow::Continue)
    }

    async fn handle_note<A: ScoringApi>(&mut self, api: &A, note: &str) -> std::io::Result<Flow> {
        if note.eq_ignore_ascii_case("cancel") {
            self.session.cancel_note();
            writeln!(self.out, "Feedback cancelled.")?;
            return Ok(Flow::Continue);
        }

        match self.session.submit_note(note) {
            Ok(record) => match self.session.send_feedback(api, &record).await {
                Ok(_) => self.feedback_accepted(api).await?,
                Err(err) => self.print_error(&err)?,
            },
            Err(FraudCheckError::LocalValidation { .. }) => {
                writeln!(self.out, "Please describe what might be the issue.")?
            }
            Err(err) => self.print_error(&err)?,
        }
        Ok(Flow::Continue)
    }

    /// An open stats panel is refetched so the feedback counters move.
    async fn feedback_accepted<A: ScoringApi>(&mut self, api: &A) -> std::io::Result<()> {
        writeln!(self.out, "Thank you for your feedback.")?;
        if !self.session.stats().visible {
            return Ok(());
        }

        match api.stats().await {
            Ok(stats) => {
                let rendered = display::render_stats(&stats, Some(self.registered_users));
                self.session.set_stats(stats);
                write!(self.out, "{rendered}")
            }
            Err(err) => self.print_error(&err),
        }
    }

    fn report(&mut self, outcome: Result<(), FraudCheckError>) -> std::io::Result<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => self.print_error(&err),
        }
    }

    fn print_error(&mut self, err: &FraudCheckError) -> std::io::Result<()> {
        writeln!(self.out, "error: {err}")
    }
}

/// Runs the console against stdin until `quit` or end of input.
pub async fn run<A: ScoringApi, W: Write>(api: &A, console: &mut Console<W>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    writeln!(console.out, "Signed in as {}. Type 'help' for commands.", display::render_user(&console.user, console.demo))?;

    loop {
        write!(console.out, "{}", console.prompt())?;
        console.out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if console.handle_line(api, &line).await? == Flow::Quit {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
impl<W: Write> Console<W> {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

fn parse_mode(raw: &str) -> Option<Mode> {
    match raw.to_ascii_lowercase().replace('_', "-").as_str() {
        "banking" | "bank" => Some(Mode::Banking),
        "credit-card" | "card" | "cc" => Some(Mode::CreditCard),
        _ => None,
    }
}
