//! Intérprete de texto del cliente con conciencia NMX.
//!
//! Flujo:
//!   1. `sanitize` limpia el texto crudo del formulario o del mensaje.
//!   2. `extract_keywords` busca las claves del glosario (orden del glosario).
//!   3. `translate_to_technician` arma el resumen técnico, la respuesta al
//!      cliente y la severidad.
//!
//! Todo es puro y síncrono: no hay E/S ni estado compartido mutable.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::glossary::Glossary;

static ZERO_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{200B}-\u{200F}]").expect("regex válida"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("regex válida"));
static DOTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").expect("regex válida"));
static BANGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!{2,}").expect("regex válida"));
static SEVERITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)fuga|goteo|tubería rota|inundación|moho|humedad").expect("regex válida")
});
static LINKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("regex válida"));

pub const URGENCY_HIGH: &str = "ALTA — coordinar visita en <24h";
pub const URGENCY_NORMAL: &str = "Normal — programar según agenda";

const CLIENT_REPLY: [&str; 2] = [
    "Gracias por el reporte. Necesitamos saber: ubicación exacta (piso/cuarto), desde cuándo ocurre, y si puede enviar fotos o video.",
    "Mientras tanto, cierre la llave principal si ve humedad o aumento del flujo.",
];

/// Opciones del intérprete.
#[derive(Debug, Clone, Copy)]
pub struct InterpretOptions {
    /// Añade la nota NMX bajo cada causa detectada. Por defecto `true`.
    pub use_nmx: bool,
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self { use_nmx: true }
    }
}

/// Resultado derivado de una sola llamada; no se persiste.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    pub cleaned: String,
    pub keywords: Vec<String>,
    pub technician_text: String,
    pub client_reply: String,
    pub severity: usize,
}

impl Interpretation {
    /// Severidad ≥ 2 se atiende en menos de 24 horas.
    pub fn is_urgent(&self) -> bool {
        self.severity >= 2
    }
}

/// Quita caracteres de ancho cero, colapsa espacios y puntuación repetida.
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let text = ZERO_WIDTH.replace_all(raw, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = DOTS.replace_all(text.trim(), ".");
    BANGS.replace_all(&text, "!").into_owned()
}

/// Claves del glosario contenidas en `text` (sin distinguir mayúsculas),
/// en el orden del glosario y sin duplicados.
pub fn extract_keywords(glossary: &Glossary, text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    glossary
        .keys()
        .filter(|key| lowered.contains(key))
        .map(str::to_string)
        .collect()
}

/// Número de coincidencias de términos de urgencia (no claves distintas).
pub fn severity(cleaned: &str) -> usize {
    SEVERITY.find_iter(cleaned).count()
}

/// Traduce el texto del cliente a un resumen para el técnico.
pub fn translate_to_technician(
    glossary: &Glossary,
    raw: &str,
    options: InterpretOptions,
) -> Interpretation {
    let cleaned = sanitize(raw);
    let keywords = extract_keywords(glossary, &cleaned);

    let mut lines: Vec<String> = vec!["Resumen técnico sugerido:".to_string()];
    if cleaned.is_empty() {
        lines.push(
            "- Sin texto de entrada. Pedir más detalles al cliente (ubicación, cuándo empezó, si hay fotos)."
                .to_string(),
        );
    } else {
        lines.push(format!("- Observación del cliente: \"{}\"", cleaned));
    }

    if keywords.is_empty() {
        lines.push(
            "- Posible interpretación: revisar visualmente la instalación; pedir fotos y ubicación exacta."
                .to_string(),
        );
    } else {
        for entry in keywords.iter().filter_map(|k| glossary.get(k)) {
            lines.push(format!(
                "- Posible causa: {}. Acción recomendada: {}.",
                entry.term, entry.action
            ));
            if !entry.parts.is_empty() {
                lines.push(format!(
                    "  - Repuestos/materiales sugeridos: {}.",
                    entry.parts.join(", ")
                ));
            }
            if options.use_nmx {
                lines.push(format!("  - Nota NMX: {}", entry.nmx_note));
            }
        }
    }

    lines.push("- Checklist técnico rápido:".to_string());
    lines.push(
        "  1) Cerrar línea y aislar la zona. 2) Evaluar presión y caudal. 3) Revisar uniones y juntas. 4) Fotografiar antes/después."
            .to_string(),
    );

    let severity = severity(&cleaned);
    let urgency = if severity >= 2 { URGENCY_HIGH } else { URGENCY_NORMAL };
    lines.push(format!("- Urgencia: {}", urgency));

    Interpretation {
        cleaned,
        keywords,
        technician_text: lines.join("\n"),
        client_reply: CLIENT_REPLY.join(" "),
        severity,
    }
}

/// Enlaces http(s) del texto, sin el signo de puntuación final.
pub fn extract_links(text: &str) -> Vec<String> {
    LINKS
        .find_iter(text)
        .map(|m| {
            let link = m.as_str();
            link.strip_suffix(['.', ',', ';']).unwrap_or(link).to_string()
        })
        .collect()
}
