//! Modelos de dominio del CRM (clientes/leads, órdenes, técnicos, reportes,
//! afiliados, backlinks).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lead capturado desde el formulario web.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service: String,
    pub address: String,
    pub street: String,
    pub colonia: Option<String>,
    pub postal_code: Option<String>,
    pub supermanzana: Option<String>,
    pub description: String,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub source: String,
    pub status: LeadStatus,
    pub notes: Vec<LeadNote>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Closed,
}

/// Nota de seguimiento que deja el técnico sobre un lead.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadNote {
    pub id: Uuid,
    pub text: String,
    pub by: String,
    pub created_at: DateTime<Utc>,
}

/// Estado de una orden de trabajo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pendiente,
    Asignada,
    EnProgreso,
    Completada,
    Cancelada,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::Asignada => "asignada",
            Self::EnProgreso => "en_progreso",
            Self::Completada => "completada",
            Self::Cancelada => "cancelada",
        }
    }

    /// Pendiente, asignada o en progreso.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pendiente | Self::Asignada | Self::EnProgreso)
    }
}

/// Orden de trabajo creada automáticamente a partir de un lead.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub lead_id: Uuid,
    pub client_name: String,
    pub client_phone: String,
    pub address: String,
    pub client_description: String,
    pub technical_interpretation: String,
    pub assigned_service: String,
    pub urgency: String,
    pub severity: usize,
    pub status: OrderStatus,
    pub assigned_technician: Option<String>,
    pub scheduled_at: Option<String>,
    pub estimated_cost: Option<f64>,
    pub actual_cost: Option<f64>,
    pub internal_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Afiliado que refiere clientes a cambio de comisión.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub id: Uuid,
    pub name: String,
    pub client_area: String,
    pub whatsapp: String,
    pub email: Option<String>,
    pub affiliate_code: String,
    pub earnings: f64,
    pub conversions: u32,
    pub status: String,
    pub payouts: Vec<Payout>,
    pub created_at: DateTime<Utc>,
}

/// Pago de comisiones solicitado; se procesa fuera del servicio.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub id: Uuid,
    pub amount: f64,
    pub method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Sitio externo que publica un enlace hacia nosotros.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backlink {
    pub id: Uuid,
    pub name: String,
    pub website: String,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
    pub backlink_code: String,
    pub status: String,
    pub traffic: u64,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Técnico de campo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Technician {
    pub id: u64,
    pub name: String,
    pub phone: String,
    /// Palabras clave que atiende (`fuga`, `goteo`, `tubería rota`...).
    pub specialties: Vec<String>,
    pub available: bool,
    pub completed_orders: u32,
    pub rating: f64,
    pub registered_at: DateTime<Utc>,
}

/// Reporte de trabajo; entregarlo cierra la orden.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkReport {
    pub id: u64,
    pub order_id: u64,
    pub technician_id: u64,
    pub description: String,
    pub materials_used: Vec<String>,
    pub photos: Vec<String>,
    /// Firma del cliente en base64.
    pub client_signature: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
