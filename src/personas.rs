//! Opponent personas: keys, labels, style prompts and the opponent system prompt.
//!
//! Style prompts live as editable markdown files under `<data_dir>/personas`,
//! seeded from the built-in defaults.

use crate::db::Position;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
pub struct PersonaFileInfo {
    pub filename: String,
    pub content: String,
    pub modified_at: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Politician,
    Scientist,
    Activist,
    Philosopher,
    Journalist,
    Lawyer,
}

impl Persona {
    pub fn all() -> [Persona; 6] {
        [
            Persona::Politician,
            Persona::Scientist,
            Persona::Activist,
            Persona::Philosopher,
            Persona::Journalist,
            Persona::Lawyer,
        ]
    }

    /// Unknown keys debate as the politician.
    pub fn from_key(key: &str) -> Persona {
        Persona::all()
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(key.trim()))
            .unwrap_or(Persona::Politician)
    }

    pub fn key(&self) -> &'static str {
        match self {
            Persona::Politician => "politician",
            Persona::Scientist => "scientist",
            Persona::Activist => "activist",
            Persona::Philosopher => "philosopher",
            Persona::Journalist => "journalist",
            Persona::Lawyer => "lawyer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Persona::Politician => "Politician",
            Persona::Scientist => "Scientist",
            Persona::Activist => "Activist",
            Persona::Philosopher => "Philosopher",
            Persona::Journalist => "Journalist",
            Persona::Lawyer => "Lawyer",
        }
    }

    pub fn default_prompt(&self) -> &'static str {
        match self {
            Persona::Politician => POLITICIAN_PROMPT,
            Persona::Scientist => SCIENTIST_PROMPT,
            Persona::Activist => ACTIVIST_PROMPT,
            Persona::Philosopher => PHILOSOPHER_PROMPT,
            Persona::Journalist => JOURNALIST_PROMPT,
            Persona::Lawyer => LAWYER_PROMPT,
        }
    }

    fn filename(&self) -> String {
        format!("{}.md", self.key())
    }

    /// Load the style prompt from disk, falling back to the default.
    pub fn load_prompt(&self, data_dir: &Path) -> String {
        let path = personas_dir(data_dir).join(self.filename());
        match fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => content,
            _ => self.default_prompt().to_string(),
        }
    }
}

const POLITICIAN_PROMPT: &str = "You are diplomatic, persuasive, and skilled at appealing to emotions while maintaining credibility. You use rhetorical devices and focus on practical implications.";

const SCIENTIST_PROMPT: &str = "You are analytical, data-driven, and methodical. You emphasize empirical evidence, studies, and logical reasoning. You question assumptions and demand proof.";

const ACTIVIST_PROMPT: &str = "You are passionate, values-driven, and emotionally compelling. You focus on moral imperatives, social justice, and the human impact of issues.";

const PHILOSOPHER_PROMPT: &str = "You are abstract, theoretical, and focused on fundamental principles. You explore underlying assumptions, ethical frameworks, and logical consistency.";

const JOURNALIST_PROMPT: &str = "You are investigative, fact-focused, and skeptical. You ask probing questions, verify claims, and present multiple perspectives.";

const LAWYER_PROMPT: &str = "You are logical, precedent-based, and argumentative. You build cases systematically, cite evidence, and identify weaknesses in opposing arguments.";

pub fn personas_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("personas")
}

/// Write defaults for any persona file that doesn't exist yet.
pub fn init_persona_files(data_dir: &Path) -> Result<()> {
    let dir = personas_dir(data_dir);
    fs::create_dir_all(&dir)?;

    for persona in Persona::all() {
        let path = dir.join(persona.filename());
        if !path.exists() {
            fs::write(&path, persona.default_prompt())?;
        }
    }
    Ok(())
}

/// All persona files with metadata, in persona order.
pub fn read_all_persona_files(data_dir: &Path) -> Result<Vec<PersonaFileInfo>> {
    init_persona_files(data_dir)?;
    let dir = personas_dir(data_dir);

    Persona::all()
        .iter()
        .map(|persona| -> Result<PersonaFileInfo> {
            let filename = persona.filename();
            let path = dir.join(&filename);
            let content = fs::read_to_string(&path)?;
            let metadata = fs::metadata(&path)?;
            let modified_at = chrono::DateTime::<chrono::Utc>::from(metadata.modified()?)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string();
            Ok(PersonaFileInfo { filename, content, modified_at, size_bytes: metadata.len() })
        })
        .collect()
}

/// Overwrite one persona file. Only the six `<key>.md` names are accepted.
pub fn write_persona_file(data_dir: &Path, filename: &str, content: &str) -> Result<()> {
    let known = Persona::all().iter().any(|p| p.filename() == filename);
    if !known {
        return Err(AppError::Invalid(format!("unknown persona file: {}", filename)));
    }
    let dir = personas_dir(data_dir);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(filename), content)?;
    Ok(())
}

/// System prompt for the opponent. The opponent always argues the side
/// opposite to the user's `position`.
pub fn opponent_system_prompt(persona: Persona, style: &str, topic: &str, position: Position) -> String {
    let opponent_side = match position.opposite() {
        Position::For => "FOR",
        Position::Against => "AGAINST",
    };
    format!(
        r#"You are debating as a {label}. {style}

The debate topic is: "{topic}"
You are arguing {opponent_side} this statement.

Your arguing style should match your persona. Keep responses focused, persuasive, and around 150-200 words.
Address the opponent's points directly and present strong counterarguments."#,
        label = persona.key(),
        style = style.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unit_from_key_defaults_to_politician() {
        assert_eq!(Persona::from_key("Lawyer"), Persona::Lawyer);
        assert_eq!(Persona::from_key(" scientist "), Persona::Scientist);
        assert_eq!(Persona::from_key("astronaut"), Persona::Politician);
        assert_eq!(Persona::from_key(""), Persona::Politician);
    }

    #[test]
    fn unit_opponent_prompt_takes_the_opposite_side() {
        let prompt = opponent_system_prompt(
            Persona::Scientist,
            Persona::Scientist.default_prompt(),
            "Cities should ban cars",
            Position::For,
        );
        assert!(prompt.starts_with("You are debating as a scientist."));
        assert!(prompt.contains("You are arguing AGAINST this statement."));
        assert!(prompt.contains("\"Cities should ban cars\""));
        assert!(prompt.contains("150-200 words"));

        let prompt = opponent_system_prompt(Persona::Lawyer, "Be sharp.", "Cities should ban cars", Position::Against);
        assert!(prompt.contains("You are arguing FOR this statement."));
    }

    #[test]
    fn integration_persona_files_seed_read_and_update() {
        let dir = tempdir().expect("temp directory should exist");
        let data_dir = dir.path();

        let files = read_all_persona_files(data_dir).expect("persona files should load");
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["politician.md", "scientist.md", "activist.md", "philosopher.md", "journalist.md", "lawyer.md"]
        );
        assert_eq!(files[1].content, Persona::Scientist.default_prompt());

        write_persona_file(data_dir, "lawyer.md", "You cite case law relentlessly.").expect("write should succeed");
        assert_eq!(Persona::Lawyer.load_prompt(data_dir), "You cite case law relentlessly.");

        assert!(matches!(
            write_persona_file(data_dir, "../config.json", "{}"),
            Err(AppError::Invalid(_))
        ));
    }

    #[test]
    fn unit_load_prompt_falls_back_when_file_missing_or_blank() {
        let dir = tempdir().expect("temp directory should exist");
        assert_eq!(Persona::Activist.load_prompt(dir.path()), Persona::Activist.default_prompt());

        init_persona_files(dir.path()).expect("init should succeed");
        fs::write(personas_dir(dir.path()).join("activist.md"), "  \n").expect("write should succeed");
        assert_eq!(Persona::Activist.load_prompt(dir.path()), Persona::Activist.default_prompt());
    }
}
