//! Exportación de tickets (JSON/CSV) y guiones de lectura en voz alta.
//!
//! Aquí sólo se generan cadenas; la descarga, el portapapeles y la síntesis
//! de voz quedan del lado del cliente.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{interpreter::Interpretation, models::Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }
}

/// Ticket listo para enviar al técnico.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceTicket {
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub technician_text: String,
    pub client_reply: String,
    pub keywords: Vec<String>,
    pub severity: usize,
}

impl ServiceTicket {
    pub fn from_interpretation(result: &Interpretation) -> Self {
        Self {
            created_at: Utc::now(),
            description: result.cleaned.clone(),
            technician_text: result.technician_text.clone(),
            client_reply: result.client_reply.clone(),
            keywords: result.keywords.clone(),
            severity: result.severity,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Encabezado + una fila; todas las celdas entre comillas.
    pub fn to_csv(&self) -> String {
        let keywords = serde_json::Value::from(self.keywords.clone()).to_string();
        let header = [
            "created_at",
            "description",
            "technician_text",
            "client_reply",
            "keywords",
            "severity",
        ]
        .map(csv_cell)
        .join(",");
        let row = [
            self.created_at.to_rfc3339(),
            self.description.clone(),
            self.technician_text.clone(),
            self.client_reply.clone(),
            keywords,
            self.severity.to_string(),
        ]
        .iter()
        .map(|value| csv_cell(value))
        .collect::<Vec<_>>()
        .join(",");
        format!("{}\n{}", header, row)
    }

    pub fn file_name(&self, format: ExportFormat) -> String {
        format!(
            "orden_{}.{}",
            self.created_at.timestamp_millis(),
            format.extension()
        )
    }
}

fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Guion para leer una orden en voz alta.
pub fn order_speech(order: &Order) -> String {
    let or_default = |value: &str, fallback: &str| {
        if value.trim().is_empty() {
            fallback.to_string()
        } else {
            value.to_string()
        }
    };

    let mut lines = vec![
        format!("Orden número {}.", order.id),
        format!("Cliente: {}.", or_default(&order.client_name, "Sin nombre")),
        format!("Teléfono: {}.", or_default(&order.client_phone, "No registrado")),
        format!("Dirección: {}.", or_default(&order.address, "No especificada")),
        format!(
            "Servicio: {}.",
            or_default(&order.assigned_service, "Por determinar")
        ),
        format!("Urgencia: {}.", order.urgency),
    ];
    if !order.technical_interpretation.is_empty() {
        lines.push(format!("Notas técnicas: {}", order.technical_interpretation));
    }
    lines.push(format!("Estado: {}.", order.status.as_str()));
    lines.join("\n")
}

pub fn alert_speech(message: &str, urgency: &str) -> String {
    format!(
        "¡ALERTA! {}. Urgencia: {}. Requiere atención inmediata.",
        message, urgency
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use uuid::Uuid;

    fn sample_ticket() -> ServiceTicket {
        ServiceTicket {
            created_at: Utc::now(),
            description: "Fuga \"fuerte\" en la cocina".to_string(),
            technician_text: "Resumen técnico sugerido:\n- Urgencia: Normal".to_string(),
            client_reply: "Gracias por el reporte.".to_string(),
            keywords: vec!["fuga".to_string()],
            severity: 1,
        }
    }

    fn sample_order() -> Order {
        Order {
            id: 7,
            lead_id: Uuid::new_v4(),
            client_name: "Ana".to_string(),
            client_phone: String::new(),
            address: "Av. Tulum 12".to_string(),
            client_description: "fuga".to_string(),
            technical_interpretation: String::new(),
            assigned_service: "Reparación de fugas".to_string(),
            urgency: "NORMAL".to_string(),
            severity: 1,
            status: OrderStatus::Pendiente,
            assigned_technician: None,
            scheduled_at: None,
            estimated_cost: None,
            actual_cost: None,
            internal_notes: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn csv_quotes_every_cell() {
        let csv = sample_ticket().to_csv();
        let mut lines = csv.splitn(2, '\n');
        assert_eq!(
            lines.next().unwrap(),
            "\"created_at\",\"description\",\"technician_text\",\"client_reply\",\"keywords\",\"severity\""
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"Fuga \"\"fuerte\"\" en la cocina\""));
        assert!(row.contains("\"[\"\"fuga\"\"]\""));
        assert!(row.ends_with(",\"1\""));
    }

    #[test]
    fn json_keeps_field_names() {
        let json = sample_ticket().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["severity"], 1);
        assert_eq!(value["keywords"][0], "fuga");
        assert!(value["technician_text"].as_str().unwrap().starts_with("Resumen"));
    }

    #[test]
    fn file_name_uses_extension() {
        let ticket = sample_ticket();
        let name = ticket.file_name(ExportFormat::Csv);
        assert!(name.starts_with("orden_"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn speech_fills_missing_fields() {
        let speech = order_speech(&sample_order());
        assert!(speech.starts_with("Orden número 7."));
        assert!(speech.contains("Teléfono: No registrado."));
        assert!(speech.contains("Estado: pendiente."));
        assert!(!speech.contains("Notas técnicas"));
    }

    #[test]
    fn speech_includes_technical_notes() {
        let mut order = sample_order();
        order.technical_interpretation = "Cambiar empaque".to_string();
        assert!(order_speech(&order).contains("Notas técnicas: Cambiar empaque"));
    }

    #[test]
    fn alert_speech_format() {
        assert_eq!(
            alert_speech("Inundación en Av. Kabah", "CRÍTICA"),
            "¡ALERTA! Inundación en Av. Kabah. Urgencia: CRÍTICA. Requiere atención inmediata."
        );
    }
}
