//! Asistente de diagnóstico "Su Servilleta": cuestionario de pocos pasos que
//! termina en un diagnóstico estático (urgencia, servicio, costo, tiempo).
//!
//! La máquina de estados es una tabla explícita `(paso, respuesta) → transición`.
//! Huecos conocidos de la tabla:
//! - `tuberia_rota` y `ruidos` no tienen diagnósticos; esas ramas nunca se
//!   completan y quedan para revisión humana.
//! - Una respuesta no mapeada en un paso de rama no avanza (se registra y se
//!   marca como no reconocida).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const INITIAL_STEP: &str = "inicio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Urgency {
    #[serde(rename = "BAJA")]
    Baja,
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "ALTA")]
    Alta,
    #[serde(rename = "CRÍTICA")]
    Critica,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baja => "BAJA",
            Self::Normal => "NORMAL",
            Self::Alta => "ALTA",
            Self::Critica => "CRÍTICA",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnóstico final de una hoja del cuestionario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisResult {
    #[serde(rename = "urgencia")]
    pub urgency: Urgency,
    #[serde(rename = "servicio")]
    pub service: &'static str,
    #[serde(rename = "materiales")]
    pub materials: &'static [&'static str],
    #[serde(rename = "costo_estimado")]
    pub estimated_cost_range: &'static str,
    #[serde(rename = "tecnico_requiere")]
    pub required_technician_level: &'static str,
    #[serde(rename = "tiempo_estimado")]
    pub estimated_duration: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionOption {
    pub text: &'static str,
    pub value: &'static str,
}

/// Pregunta de un paso. `follow_up` es informativo; no afecta transiciones.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub question: &'static str,
    pub options: &'static [QuestionOption],
    #[serde(rename = "followUp", skip_serializing_if = "<[_]>::is_empty")]
    pub follow_up: &'static [(&'static str, &'static str)],
}

const fn opt(text: &'static str, value: &'static str) -> QuestionOption {
    QuestionOption { text, value }
}

static QUESTIONS: &[(&str, Question)] = &[
    (
        "inicio",
        Question {
            question: "¿Cuál es el problema principal que tiene?",
            options: &[
                opt("💧 Fuga de agua", "fuga"),
                opt("🚿 Baja presión de agua", "baja_presion"),
                opt("🚽 Inodoro con problemas", "inodoro"),
                opt("🔧 Tubería rota/dañada", "tuberia_rota"),
                opt("🌊 Obstrucción/drenaje lento", "obstruccion"),
                opt("💨 Ruidos extraños", "ruidos"),
                opt("🧊 Calentador sin agua caliente", "agua_caliente"),
            ],
            follow_up: &[],
        },
    ),
    (
        "fuga",
        Question {
            question: "¿Dónde está la fuga?",
            options: &[
                opt("🚿 Grifo/llave", "fuga_grifo"),
                opt("Debajo del fregadero", "fuga_fregadero"),
                opt("🚽 Inodoro", "fuga_inodoro"),
                opt("🛁 Ducha/tina", "fuga_ducha"),
                opt("Tubería visible en pared", "fuga_tuberia_pared"),
                opt("🏠 Bajo tierra/piso", "fuga_subterranea"),
            ],
            follow_up: &[
                ("fuga_grifo", "¿Hay gotas constantes o tiene presión toda el agua?"),
                ("fuga_fregadero", "¿De dónde sale el agua: las tuberías, la junta o del grifo?"),
                ("fuga_tuberia_pared", "¿Es una gota por minuto o más rápido?"),
                ("fuga_subterranea", "¿Ves humedad en el piso o hay manchas de agua?"),
            ],
        },
    ),
    (
        "baja_presion",
        Question {
            question: "¿Es baja presión en toda la casa o solo en un grifo?",
            options: &[
                opt("Solo en un grifo", "presion_un_grifo"),
                opt("En toda la casa", "presion_toda_casa"),
                opt("Solo agua caliente tiene baja presión", "presion_agua_caliente"),
            ],
            follow_up: &[],
        },
    ),
    (
        "inodoro",
        Question {
            question: "¿Cuál es el problema del inodoro?",
            options: &[
                opt("No baja el agua (se va lento)", "inodoro_lento"),
                opt("Usa mucha agua / fluye continuo", "inodoro_fugas"),
                opt("Se destapa constantemente", "inodoro_destapado"),
                opt("Hace ruidos raros", "inodoro_ruido"),
            ],
            follow_up: &[],
        },
    ),
    (
        "tuberia_rota",
        Question {
            question: "¿Qué tipo de tubería es?",
            options: &[
                opt("PVC blanca (común)", "pvc"),
                opt("Cobre", "cobre"),
                opt("Galvanizada/hierro", "galvanizada"),
                opt("No sé", "desconocida"),
            ],
            follow_up: &[],
        },
    ),
    (
        "obstruccion",
        Question {
            question: "¿Qué drenaje está obstruido?",
            options: &[
                opt("Fregadero/cocina", "obs_cocina"),
                opt("Baño/lavado", "obs_bano"),
                opt("Ducha/tina", "obs_ducha"),
                opt("Inodoro", "obs_inodoro"),
                opt("Drenaje general (toda la casa)", "obs_general"),
            ],
            follow_up: &[],
        },
    ),
    (
        "ruidos",
        Question {
            question: "¿Qué tipo de ruido escuchas?",
            options: &[
                opt("Golpes/martilleo", "golpes"),
                opt("Silbido/zumbido", "silbido"),
                opt("Gorgoteo/borboteo", "gorgoteo"),
                opt("Crujidos", "crujidos"),
            ],
            follow_up: &[],
        },
    ),
    (
        "agua_caliente",
        Question {
            question: "¿Cómo es el problema?",
            options: &[
                opt("No sale agua caliente", "sin_agua_caliente"),
                opt("Sale tibia nada más", "tibia"),
                opt("Tarda mucho en calentar", "tarda_calentar"),
                opt("Sale agua caliente pero se enfría rápido", "se_enfria"),
            ],
            follow_up: &[],
        },
    ),
];

static RESULTS: &[(&str, DiagnosisResult)] = &[
    (
        "fuga_grifo",
        DiagnosisResult {
            urgency: Urgency::Normal,
            service: "Reparación/Cambio de grifo",
            materials: &["Grifo nuevo", "Teflón", "Llave de paso"],
            estimated_cost_range: "200-400",
            required_technician_level: "Básico",
            estimated_duration: "30 minutos",
        },
    ),
    (
        "fuga_fregadero",
        DiagnosisResult {
            urgency: Urgency::Normal,
            service: "Reparación de tuberías bajo fregadero",
            materials: &["Tuberías PVC/cobre", "Conectores", "Teflón", "Silicona"],
            estimated_cost_range: "400-650",
            required_technician_level: "Intermedio",
            estimated_duration: "60 minutos",
        },
    ),
    (
        "fuga_tuberia_pared",
        DiagnosisResult {
            urgency: Urgency::Alta,
            service: "Reparación urgente de tubería",
            materials: &["Parches epoxy", "Abrazaderas", "Tuberías"],
            estimated_cost_range: "600-1200",
            required_technician_level: "Avanzado",
            estimated_duration: "90 minutos",
        },
    ),
    (
        "fuga_subterranea",
        DiagnosisResult {
            urgency: Urgency::Critica,
            service: "Localización y reparación de fuga subterránea - EMERGENCIA",
            materials: &["Detector de fugas", "Tuberías", "Excavación"],
            estimated_cost_range: "1500-3000",
            required_technician_level: "Especialista",
            estimated_duration: "3-4 horas",
        },
    ),
    (
        "presion_un_grifo",
        DiagnosisResult {
            urgency: Urgency::Baja,
            service: "Limpieza de aerificador/filtro o cambio de grifo",
            materials: &["Aerificador", "Filtros", "Grifo si es necesario"],
            estimated_cost_range: "100-300",
            required_technician_level: "Básico",
            estimated_duration: "20 minutos",
        },
    ),
    (
        "presion_toda_casa",
        DiagnosisResult {
            urgency: Urgency::Normal,
            service: "Revisión de regulador de presión y tuberías",
            materials: &["Regulador de presión", "Filtro principal"],
            estimated_cost_range: "400-800",
            required_technician_level: "Intermedio",
            estimated_duration: "60 minutos",
        },
    ),
    (
        "inodoro_lento",
        DiagnosisResult {
            urgency: Urgency::Normal,
            service: "Destapo de inodoro",
            materials: &["Destapadera", "Químico destapador si es necesario"],
            estimated_cost_range: "150-300",
            required_technician_level: "Básico",
            estimated_duration: "30 minutos",
        },
    ),
    (
        "inodoro_fugas",
        DiagnosisResult {
            urgency: Urgency::Normal,
            service: "Reparación de válvula de fluxómetro/cisterna",
            materials: &["Válvula nueva", "Sello de hule", "Tornillos"],
            estimated_cost_range: "300-500",
            required_technician_level: "Básico",
            estimated_duration: "45 minutos",
        },
    ),
    (
        "obs_cocina",
        DiagnosisResult {
            urgency: Urgency::Normal,
            service: "Destapo de drenaje de cocina",
            materials: &["Destapador, sifón limpio, químico"],
            estimated_cost_range: "150-350",
            required_technician_level: "Básico",
            estimated_duration: "45 minutos",
        },
    ),
    (
        "obs_general",
        DiagnosisResult {
            urgency: Urgency::Critica,
            service: "Destapo de línea principal - EMERGENCIA",
            materials: &["Equipos de presión, rooter, soluciones"],
            estimated_cost_range: "1200-2500",
            required_technician_level: "Especialista",
            estimated_duration: "2-4 horas",
        },
    ),
    (
        "agua_caliente_sin",
        DiagnosisResult {
            urgency: Urgency::Normal,
            service: "Reparación/cambio de calentador",
            materials: &["Calentador nuevo o pieza de repuesto"],
            estimated_cost_range: "800-2000",
            required_technician_level: "Especialista",
            estimated_duration: "2 horas",
        },
    ),
];

/// Hojas: (paso, respuesta, clave de diagnóstico).
static LEAVES: &[(&str, &str, &str)] = &[
    ("fuga", "fuga_grifo", "fuga_grifo"),
    ("fuga", "fuga_fregadero", "fuga_fregadero"),
    ("fuga", "fuga_tuberia_pared", "fuga_tuberia_pared"),
    ("fuga", "fuga_subterranea", "fuga_subterranea"),
    ("baja_presion", "presion_un_grifo", "presion_un_grifo"),
    ("baja_presion", "presion_toda_casa", "presion_toda_casa"),
    ("inodoro", "inodoro_lento", "inodoro_lento"),
    ("inodoro", "inodoro_fugas", "inodoro_fugas"),
    ("obstruccion", "obs_cocina", "obs_cocina"),
    ("obstruccion", "obs_general", "obs_general"),
    ("agua_caliente", "sin_agua_caliente", "agua_caliente_sin"),
];

pub fn question(step: &str) -> Option<&'static Question> {
    QUESTIONS.iter().find(|(k, _)| *k == step).map(|(_, q)| q)
}

pub fn result(key: &str) -> Option<&'static DiagnosisResult> {
    RESULTS.iter().find(|(k, _)| *k == key).map(|(_, r)| r)
}

/// Transición de un paso dada una respuesta.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// El paso inicial: la categoría elegida pasa a ser el siguiente paso.
    Step(String),
    /// Hoja con diagnóstico.
    Complete(&'static DiagnosisResult),
    /// Respuesta sin hoja mapeada: el paso no cambia.
    Stall,
}

pub fn transition(step: &str, answer: &str) -> Transition {
    if step == INITIAL_STEP {
        return Transition::Step(answer.to_string());
    }
    LEAVES
        .iter()
        .find(|(s, a, _)| *s == step && *a == answer)
        .and_then(|(_, _, key)| result(key))
        .map(Transition::Complete)
        .unwrap_or(Transition::Stall)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOutcome {
    Next,
    Complete,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiagnosisError {
    #[error("el diagnóstico ya está completo; reinicie la sesión para empezar otro")]
    AlreadyComplete,
}

/// Respuestas en orden de inserción (la primera clave es la del primer paso).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Answers(Vec<(String, String)>);

impl Answers {
    fn insert(&mut self, step: &str, answer: &str) {
        match self.0.iter_mut().find(|(k, _)| k == step) {
            Some((_, value)) => *value = answer.to_string(),
            None => self.0.push((step.to_string(), answer.to_string())),
        }
    }

    pub fn first_step(&self) -> Option<&str> {
        self.0.first().map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
impl Answers {
    pub fn get(&self, step: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == step)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Answers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Registro entregado al completar el cuestionario.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub problema: String,
    pub respuestas: Answers,
    pub diagnostico: DiagnosisResult,
    pub timestamp: DateTime<Utc>,
    pub order_id: String,
}

static ORDER_SEQ: AtomicU64 = AtomicU64::new(1);

/// `ORD-<millis>-<secuencia>`, único dentro del proceso.
pub fn next_order_id() -> String {
    let seq = ORDER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), seq)
}

/// Estado de una conversación. Cada conversación posee su propia sesión.
#[derive(Debug, Clone)]
pub struct DiagnosisSession {
    current_step: String,
    answers: Answers,
    diagnosis: Option<&'static DiagnosisResult>,
    last_answer_recognized: bool,
}

impl Default for DiagnosisSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosisSession {
    pub fn new() -> Self {
        Self {
            current_step: INITIAL_STEP.to_string(),
            answers: Answers::default(),
            diagnosis: None,
            last_answer_recognized: true,
        }
    }

    pub fn current_step(&self) -> &str {
        &self.current_step
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn diagnosis(&self) -> Option<&'static DiagnosisResult> {
        self.diagnosis
    }

    pub fn is_complete(&self) -> bool {
        self.diagnosis.is_some()
    }

    /// `false` si la última respuesta no tenía hoja en un paso de rama.
    pub fn last_answer_recognized(&self) -> bool {
        self.last_answer_recognized
    }

    /// Pregunta del paso actual; `None` si el paso no existe en el catálogo
    /// (categoría desconocida elegida en `inicio`).
    pub fn question(&self) -> Option<&'static Question> {
        question(&self.current_step)
    }

    pub fn answer(&mut self, answer: &str) -> Result<AnswerOutcome, DiagnosisError> {
        if self.is_complete() {
            return Err(DiagnosisError::AlreadyComplete);
        }
        self.answers.insert(&self.current_step, answer);

        match transition(&self.current_step, answer) {
            Transition::Step(next) => {
                debug!("Diagnóstico: {} → {}", self.current_step, next);
                self.current_step = next;
                self.last_answer_recognized = true;
            }
            Transition::Complete(result) => {
                debug!("Diagnóstico completo en {}: {}", self.current_step, result.service);
                self.diagnosis = Some(result);
                self.last_answer_recognized = true;
            }
            Transition::Stall => {
                warn!(
                    "Respuesta '{}' sin diagnóstico en el paso '{}'",
                    answer, self.current_step
                );
                self.last_answer_recognized = false;
            }
        }

        Ok(if self.is_complete() {
            AnswerOutcome::Complete
        } else {
            AnswerOutcome::Next
        })
    }

    pub fn report(&self) -> Option<DiagnosisReport> {
        let diagnosis = self.diagnosis?;
        Some(DiagnosisReport {
            problema: self.answers.first_step().unwrap_or_default().to_string(),
            respuestas: self.answers.clone(),
            diagnostico: diagnosis.clone(),
            timestamp: Utc::now(),
            order_id: next_order_id(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_starts_at_inicio() {
        let session = DiagnosisSession::new();
        assert_eq!(session.current_step(), "inicio");
        assert_eq!(
            session.question().unwrap().question,
            "¿Cuál es el problema principal que tiene?"
        );
        assert!(session.answers().is_empty());
        assert!(session.report().is_none());
    }

    #[test]
    fn choosing_category_moves_to_its_step() {
        let mut session = DiagnosisSession::new();
        assert_eq!(session.answer("fuga"), Ok(AnswerOutcome::Next));
        assert_eq!(session.current_step(), "fuga");
        assert_eq!(session.question().unwrap().question, "¿Dónde está la fuga?");
    }

    #[test]
    fn underground_leak_is_critical() {
        let mut session = DiagnosisSession::new();
        session.answer("fuga").unwrap();
        assert_eq!(session.answer("fuga_subterranea"), Ok(AnswerOutcome::Complete));

        let diagnosis = session.diagnosis().unwrap();
        assert_eq!(diagnosis.urgency, Urgency::Critica);
        assert_eq!(diagnosis, result("fuga_subterranea").unwrap());

        let report = session.report().unwrap();
        assert_eq!(report.diagnostico.urgency, Urgency::Critica);
        assert_eq!(report.problema, "inicio");
        assert_eq!(report.respuestas.get("inicio"), Some("fuga"));
        assert_eq!(report.respuestas.get("fuga"), Some("fuga_subterranea"));
        assert!(report.order_id.starts_with("ORD-"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["diagnostico"]["urgencia"], "CRÍTICA");
        assert_eq!(json["respuestas"]["fuga"], "fuga_subterranea");
    }

    #[test]
    fn hot_water_leaf_maps_to_heater_repair() {
        let mut session = DiagnosisSession::new();
        session.answer("agua_caliente").unwrap();
        assert_eq!(session.answer("sin_agua_caliente"), Ok(AnswerOutcome::Complete));
        assert_eq!(session.diagnosis().unwrap().service, "Reparación/cambio de calentador");
    }

    #[test]
    fn unmapped_answer_stalls_without_diagnosis() {
        let mut session = DiagnosisSession::new();
        session.answer("fuga").unwrap();
        assert_eq!(session.answer("fuga_ducha"), Ok(AnswerOutcome::Next));
        assert_eq!(session.current_step(), "fuga");
        assert!(session.diagnosis().is_none());
        assert!(!session.last_answer_recognized());

        // Un segundo intento en el mismo paso sobrescribe la respuesta.
        assert_eq!(session.answer("fuga_grifo"), Ok(AnswerOutcome::Complete));
        assert!(session.last_answer_recognized());
        assert_eq!(session.answers().len(), 2);
        assert_eq!(session.answers().get("fuga"), Some("fuga_grifo"));
    }

    #[test]
    fn branches_without_results_never_complete() {
        for (category, options) in [
            ("tuberia_rota", ["pvc", "cobre", "galvanizada", "desconocida"]),
            ("ruidos", ["golpes", "silbido", "gorgoteo", "crujidos"]),
        ] {
            for option in options {
                let mut session = DiagnosisSession::new();
                session.answer(category).unwrap();
                assert_eq!(session.answer(option), Ok(AnswerOutcome::Next));
                assert!(!session.is_complete());
            }
        }
    }

    #[test]
    fn unknown_category_has_no_question() {
        let mut session = DiagnosisSession::new();
        assert_eq!(session.answer("humedad"), Ok(AnswerOutcome::Next));
        assert_eq!(session.current_step(), "humedad");
        assert!(session.question().is_none());
        assert_eq!(session.answer("lo_que_sea"), Ok(AnswerOutcome::Next));
        assert!(!session.is_complete());
    }

    #[test]
    fn completed_session_rejects_answers() {
        let mut session = DiagnosisSession::new();
        session.answer("obstruccion").unwrap();
        session.answer("obs_general").unwrap();
        assert_eq!(session.answer("fuga"), Err(DiagnosisError::AlreadyComplete));
        assert_eq!(session.answers().len(), 2);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut session = DiagnosisSession::new();
        session.answer("inodoro").unwrap();
        session.answer("inodoro_lento").unwrap();
        assert!(session.is_complete());

        session.reset();
        assert_eq!(session.current_step(), "inicio");
        assert!(session.answers().is_empty());
        assert!(session.diagnosis().is_none());
        assert_eq!(session.answer("baja_presion"), Ok(AnswerOutcome::Next));
    }

    #[test]
    fn pressure_prompt_wording() {
        let q = question("baja_presion").unwrap();
        assert_eq!(
            q.question,
            "¿Es baja presión en toda la casa o solo en un grifo?"
        );
        assert_eq!(q.options[1].value, "presion_toda_casa");
    }

    #[test]
    fn every_leaf_points_to_a_result_and_an_option() {
        for (step, answer, key) in LEAVES {
            assert!(result(key).is_some(), "falta diagnóstico {key}");
            let q = question(step).unwrap_or_else(|| panic!("falta paso {step}"));
            assert!(
                q.options.iter().any(|o| o.value == *answer),
                "{answer} no es opción de {step}"
            );
        }
    }

    #[test]
    fn every_category_has_a_question() {
        let inicio = question(INITIAL_STEP).unwrap();
        for option in inicio.options {
            assert!(question(option.value).is_some(), "falta paso {}", option.value);
        }
    }

    #[test]
    fn order_ids_are_unique() {
        let a = next_order_id();
        let b = next_order_id();
        assert_ne!(a, b);
        assert!(a.starts_with("ORD-"));
    }
}
