use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

/// Which generation backend the pipeline talks to. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    /// OpenAI-compatible chat completions endpoint.
    OpenAi,
    /// Offline stub that echoes part of the prompt back.
    Echo,
}

impl FromStr for GeneratorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "llm" => Ok(Self::OpenAi),
            "echo" | "stub" => Ok(Self::Echo),
            other => Err(anyhow::anyhow!(
                "unknown GENERATOR '{}': expected 'openai' or 'echo'",
                other
            )),
        }
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub session_ttl: Duration,
    pub max_upload_mb: u64,
    pub embed_dim: usize,
    pub chunk_max_chars: usize,
    pub default_top_k: usize,
    pub default_context_chars: usize,
    pub memory_max_turns: usize,
    /// Turns of history chained into each answer prompt.
    pub history_turns: usize,
    pub transcribe_timeout: Duration,
    pub generator: GeneratorKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(3600),
            max_upload_mb: 100,
            embed_dim: 1024,
            chunk_max_chars: 800,
            default_top_k: 8,
            default_context_chars: 6000,
            memory_max_turns: 20,
            history_turns: 5,
            transcribe_timeout: Duration::from_secs(120),
            generator: GeneratorKind::Echo,
        }
    }
}

impl Config {
    /// Build from the environment (after `dotenv` has loaded `.env`).
    /// Missing keys fall back to defaults; malformed values are an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            session_ttl: Duration::from_secs(env_or(
                "SESSION_TTL_SECONDS",
                defaults.session_ttl.as_secs(),
            )?),
            max_upload_mb: env_or("MAX_FILE_MB", defaults.max_upload_mb)?,
            embed_dim: env_or("EMBED_DIM", defaults.embed_dim)?,
            chunk_max_chars: env_or("CHUNK_MAX_CHARS", defaults.chunk_max_chars)?,
            default_top_k: env_or("DEFAULT_TOP_K", defaults.default_top_k)?,
            default_context_chars: env_or(
                "DEFAULT_CONTEXT_CHARS",
                defaults.default_context_chars,
            )?,
            memory_max_turns: env_or("MEMORY_MAX_TURNS", defaults.memory_max_turns)?,
            history_turns: env_or("HISTORY_TURNS", defaults.history_turns)?,
            transcribe_timeout: Duration::from_secs(env_or(
                "TRANSCRIBE_TIMEOUT_SECONDS",
                defaults.transcribe_timeout.as_secs(),
            )?),
            generator: env_or("GENERATOR", defaults.generator)?,
        })
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match dotenv::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {}: '{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.max_upload_mb, 100);
        assert_eq!(config.embed_dim, 1024);
        assert_eq!(config.memory_max_turns, 20);
        assert_eq!(config.max_upload_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_generator_kind_parse() {
        assert_eq!("openai".parse::<GeneratorKind>().unwrap(), GeneratorKind::OpenAi);
        assert_eq!(" Echo ".parse::<GeneratorKind>().unwrap(), GeneratorKind::Echo);
        assert!("gemini".parse::<GeneratorKind>().is_err());
    }

    #[test]
    fn test_env_or_falls_back_for_unset_key() {
        let value: usize = env_or("RAGBOOK_TEST_UNSET_KEY_42", 7).unwrap();
        assert_eq!(value, 7);
    }
}
