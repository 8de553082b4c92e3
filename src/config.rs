//! Carga y gestión de configuración de la aplicación.

use std::env;

use anyhow::{anyhow, Result};

use crate::interpreter::InterpretOptions;

pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 30;
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
/// Una semana.
const MAX_SESSION_IDLE_MINUTES: i64 = 7 * 24 * 60;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub frontend_dir: String,
    /// Valor por defecto de `useNmx` cuando la petición no lo indica.
    pub use_nmx: bool,
    pub open_browser: bool,
    /// Minutos sin actividad tras los que se descarta una sesión del asistente.
    pub session_idle_minutes: i64,
    pub max_sessions: usize,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
        let frontend_dir = env::var("FRONTEND_DIR").unwrap_or_else(|_| "frontend".to_string());

        let use_nmx = match env::var("USE_NMX") {
            Ok(value) => parse_bool(&value).ok_or_else(|| anyhow!("USE_NMX inválido: {value}"))?,
            Err(_) => true,
        };
        let open_browser = match env::var("OPEN_BROWSER") {
            Ok(value) => {
                parse_bool(&value).ok_or_else(|| anyhow!("OPEN_BROWSER inválido: {value}"))?
            }
            Err(_) => false,
        };
        let session_idle_minutes = match env::var("SESSION_IDLE_MINUTES") {
            Ok(value) => value
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|m| (1..=MAX_SESSION_IDLE_MINUTES).contains(m))
                .ok_or_else(|| anyhow!("SESSION_IDLE_MINUTES inválido: {value}"))?,
            Err(_) => DEFAULT_SESSION_IDLE_MINUTES,
        };
        let max_sessions = match env::var("MAX_SESSIONS") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("MAX_SESSIONS inválido: {value}"))?,
            Err(_) => DEFAULT_MAX_SESSIONS,
        };

        Ok(Self {
            server_addr,
            frontend_dir,
            use_nmx,
            open_browser,
            session_idle_minutes,
            max_sessions,
        })
    }

    pub fn interpret_options(&self) -> InterpretOptions {
        InterpretOptions {
            use_nmx: self.use_nmx,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3000".to_string(),
            frontend_dir: "frontend".to_string(),
            use_nmx: true,
            open_browser: false,
            session_idle_minutes: DEFAULT_SESSION_IDLE_MINUTES,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "si" | "sí" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_accept_spanish() {
        assert_eq!(parse_bool("Sí"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("tal vez"), None);
    }

    #[test]
    fn defaults_enable_nmx() {
        let cfg = AppConfig::default();
        assert!(cfg.interpret_options().use_nmx);
        assert!(!cfg.open_browser);
        assert_eq!(cfg.session_idle_minutes, 30);
        assert_eq!(cfg.max_sessions, 10_000);
    }
}
