//! Glosario NMX: palabras habituales del cliente → terminología técnica,
//! acción recomendada, materiales sugeridos y nota de cumplimiento.
//!
//! Se construye una sola vez al arrancar y se comparte por referencia
//! (`Arc<Glossary>`) entre todos los handlers. El orden de definición es
//! significativo: `extract_keywords` devuelve las claves en este orden.

use serde::Serialize;

/// Una entrada del glosario.
#[derive(Debug, Clone, Serialize)]
pub struct GlossaryEntry {
    /// Término técnico canónico.
    pub term: &'static str,
    /// Acción recomendada para el técnico.
    pub action: &'static str,
    /// Materiales sugeridos, en orden.
    pub parts: &'static [&'static str],
    /// Nota de cumplimiento NMX.
    pub nmx_note: &'static str,
}

/// Tabla inmutable clave → entrada, en orden de definición.
#[derive(Debug, Clone)]
pub struct Glossary {
    entries: Vec<(&'static str, GlossaryEntry)>,
}

impl Glossary {
    /// Glosario de plomería con anotaciones de la Norma Mexicana.
    pub fn nmx() -> Self {
        let entries = vec![
            (
                "fuga",
                GlossaryEntry {
                    term: "fuga de agua",
                    action: "Localizar origen (unión, junta, tubería fisurada)",
                    parts: &["Cinta de teflón", "Sellador de roscas", "Junta de goma"],
                    nmx_note: "Revisar conectores y uniones según NMX aplicable.",
                },
            ),
            (
                "tubería rota",
                GlossaryEntry {
                    term: "tubería con fisura/ruptura",
                    action: "Reemplazo de tramo afectado o reparación con acople",
                    parts: &["Tramo de tubería PVC/CPVC/CP- conforme al tipo"],
                    nmx_note: "Confirmar material y diámetro conforme a norma.",
                },
            ),
            (
                "goteo",
                GlossaryEntry {
                    term: "goteo en grifo/llave",
                    action: "Inspeccionar asiento y empaquetadura; cambiar arandelas o cartucho",
                    parts: &["Empaquetadura", "Cartucho de grifo"],
                    nmx_note: "Verificar presión de línea si el goteo es por exceso.",
                },
            ),
            (
                "agua",
                GlossaryEntry {
                    term: "flujo/caudal/agua",
                    action: "Verificar presión y caudal en la instalación",
                    parts: &["Manómetro", "Válvula reguladora de presión"],
                    nmx_note: "Documentar presión (kPa) para cumplimiento NMX si aplica.",
                },
            ),
            (
                "mal olor",
                GlossaryEntry {
                    term: "obstrucción o sifón seco",
                    action: "Revisar trampas, sifones y desagües; limpiar o reemplazar",
                    parts: &["Desatascador", "Manguera de limpieza"],
                    nmx_note: "Asegurar sello de agua en sifones según prácticas NMX.",
                },
            ),
        ];
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&GlossaryEntry> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, entry)| entry)
    }

    /// Itera en orden de definición.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &GlossaryEntry)> {
        self.entries.iter().map(|(k, entry)| (*k, entry))
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_keep_definition_order() {
        let glossary = Glossary::nmx();
        let keys: Vec<_> = glossary.keys().collect();
        assert_eq!(keys, vec!["fuga", "tubería rota", "goteo", "agua", "mal olor"]);
        assert_eq!(glossary.len(), 5);
    }

    #[test]
    fn lookup_by_key() {
        let glossary = Glossary::nmx();
        let entry = glossary.get("goteo").unwrap();
        assert_eq!(entry.term, "goteo en grifo/llave");
        assert_eq!(entry.parts, &["Empaquetadura", "Cartucho de grifo"]);
        assert!(glossary.get("inexistente").is_none());
    }
}
