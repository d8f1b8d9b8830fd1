//! Command-line front end over `DebateService`.

use crate::analyzer::analyze;
use crate::config::FallacyMode;
use crate::db::User;
use crate::error::Result;
use crate::fallacies::PatternClassifier;
use crate::personas::Persona;
use crate::service::{ArgumentAnalysis, DebateService, SettingsUpdate, TurnOutcome};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Practice debating against AI opponents, with argument scoring and
/// fallacy detection.
#[derive(Parser, Debug)]
#[command(name = "debatemate", version, about)]
pub struct Cli {
    /// Where the database, config and persona files live
    #[arg(long, env = "DEBATEMATE_DATA_DIR", default_value = ".debatemate", global = true)]
    pub data_dir: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score an argument and list its fallacies as JSON
    Score {
        /// The argument text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Heuristic scores and phrase rules only, even with an API key configured
        #[arg(long)]
        offline: bool,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// Start a new debate
    New {
        #[arg(long)]
        email: String,
        #[arg(long)]
        topic: String,
        /// Your side: for or against
        #[arg(long)]
        position: String,
        /// politician, scientist, activist, philosopher, journalist or lawyer
        #[arg(long, default_value = "politician")]
        opponent: String,
    },
    /// List your debates, newest first
    Debates {
        #[arg(long)]
        email: String,
    },
    /// Print a debate with its messages and fallacy log
    Show { debate_id: String },
    /// Argue interactively; `/end` finishes the debate, `/quit` leaves it open
    Debate { debate_id: String },
    /// Mark a debate completed
    End { debate_id: String },
    /// Progress report over the last 30 days
    Progress {
        #[arg(long)]
        email: String,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change settings
    Config(ConfigArgs),
    /// List or edit opponent persona prompts
    Personas(PersonasArgs),
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        analysis_model: Option<String>,
        /// delegated, patterns or off
        #[arg(long)]
        fallacy_mode: Option<FallacyMode>,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Args, Debug)]
pub struct PersonasArgs {
    #[command(subcommand)]
    pub action: Option<PersonasAction>,
}

#[derive(Subcommand, Debug)]
pub enum PersonasAction {
    List,
    /// Replace a persona prompt with the contents of a file
    Set {
        /// e.g. lawyer.md
        filename: String,
        #[arg(long)]
        from: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn execute(cli: Cli) -> Result<()> {
    if let Command::Score { text, offline: true } = &cli.command {
        let text = text.join(" ");
        let analysis = ArgumentAnalysis { scores: analyze(&text), fallacies: PatternClassifier::classify(&text) };
        return print_json(&analysis);
    }

    let mut service = DebateService::open(&cli.data_dir)?;
    match cli.command {
        Command::Score { text, .. } => print_json(&service.analyze_argument(&text.join(" ")).await),
        Command::Register { email, name } => print_json(&service.register(&email, &name)?),
        Command::New { email, topic, position, opponent } => {
            let user = service.login(&email)?;
            print_json(&service.create_debate(&user.id, &topic, &position, &opponent)?)
        }
        Command::Debates { email } => {
            let user = service.login(&email)?;
            print_json(&service.list_debates(&user.id)?)
        }
        Command::Show { debate_id } => print_json(&service.get_debate(&debate_id)?),
        Command::Debate { debate_id } => debate_loop(&service, &debate_id).await,
        Command::End { debate_id } => print_json(&service.end_debate(&debate_id)?),
        Command::Progress { email, json } => {
            let user: User = service.login(&email)?;
            let report = service.progress(&user.id)?;
            if json {
                return print_json(&report);
            }
            println!("{}", report.headline());
            for tip in &report.tips {
                println!("- {}: {}", tip.title, tip.detail);
            }
            Ok(())
        }
        Command::Config(ConfigArgs { action }) => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => print_json(&service.get_settings()),
            ConfigAction::Set { api_key, model, analysis_model, fallacy_mode, timeout_secs } => {
                let update = SettingsUpdate {
                    api_key,
                    model,
                    analysis_model,
                    fallacy_mode,
                    request_timeout_secs: timeout_secs,
                };
                print_json(&service.save_settings(update)?)
            }
        },
        Command::Personas(PersonasArgs { action }) => match action.unwrap_or(PersonasAction::List) {
            PersonasAction::List => print_json(&service.get_persona_files()?),
            PersonasAction::Set { filename, from } => {
                let content = std::fs::read_to_string(&from)?;
                service.update_persona_file(&filename, &content)?;
                println!("updated {}", filename);
                Ok(())
            }
        },
    }
}

async fn debate_loop(service: &DebateService, debate_id: &str) -> Result<()> {
    let detail = service.get_debate(debate_id)?;
    println!(
        "Topic: {}\nYou argue {} against the {}. Type /end to finish, /quit to leave.",
        detail.debate.topic,
        detail.debate.position.as_str().to_uppercase(),
        Persona::from_key(&detail.debate.opponent_type).label()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nyou> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/end" => {
                let debate = service.end_debate(debate_id)?;
                println!("Debate {} after {} turns.", debate.status.as_str(), debate.turn_count);
                break;
            }
            argument => {
                print!("\nopponent> ");
                std::io::stdout().flush()?;
                let mut on_token = |token: &str| {
                    print!("{}", token);
                    let _ = std::io::stdout().flush();
                };
                let outcome = service.send_message(debate_id, argument, &mut on_token).await?;
                println!();
                print_turn_summary(&outcome);
            }
        }
    }
    Ok(())
}

fn print_turn_summary(outcome: &TurnOutcome) {
    if let Some(scores) = outcome.user_message.scores {
        println!(
            "\n[score] overall {} | clarity {} | evidence {} | logic {} | persuasiveness {}",
            scores.overall(),
            scores.clarity(),
            scores.evidence(),
            scores.logic(),
            scores.persuasiveness()
        );
    }
    for finding in outcome.user_message.fallacies.iter().flatten() {
        println!("[fallacy:{}] {}: {}", finding.severity.as_str(), finding.kind, finding.description);
    }
}
