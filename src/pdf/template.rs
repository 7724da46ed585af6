//! Blank stand-in for the attestation form.
//!
//! Draws the static labels of the form at the positions the filled-in fields
//! expect, so the tool can be tried without the official template.

use anyhow::{anyhow, Result};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use crate::attestation::REASON_CHECKBOX_X;
use crate::config::ReasonKey;

const A4_WIDTH_MM: f32 = 210.0;
const A4_HEIGHT_MM: f32 = 297.0;

fn pt(points: f64) -> Mm {
    Mm((points * 25.4 / 72.0) as f32)
}

fn label(layer: &PdfLayerReference, font: &IndirectFontRef, text: &str, size: f32, x: f64, y: f64) {
    layer.use_text(text, size, pt(x), pt(y), font);
}

fn reason_label(reason: ReasonKey) -> &'static str {
    match reason {
        ReasonKey::Travail => "Deplacements entre le domicile et le lieu de travail",
        ReasonKey::Achats => "Achats de fournitures necessaires a l'activite",
        ReasonKey::Sante => "Consultations, examens et soins",
        ReasonKey::Famille => "Motif familial imperieux",
        ReasonKey::Handicap => "Personnes en situation de handicap",
        ReasonKey::SportAnimaux => "Deplacements brefs, activite physique, animaux",
        ReasonKey::Convocation => "Convocation judiciaire ou administrative",
        ReasonKey::Missions => "Participation a des missions d'interet general",
        ReasonKey::Enfants => "Deplacement pour chercher les enfants a l'ecole",
    }
}

/// Build a one-page A4 form and return it as PDF bytes
pub fn blank_template() -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        "Attestation de deplacement derogatoire",
        Mm(A4_WIDTH_MM),
        Mm(A4_HEIGHT_MM),
        "Layer 1",
    );
    let layer = doc.get_page(page).get_layer(layer);

    let font_bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("Failed to add Helvetica-Bold: {:?}", e))?;
    let font = doc.add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("Failed to add Helvetica: {:?}", e))?;

    label(&layer, &font_bold, "ATTESTATION DE DEPLACEMENT DEROGATOIRE", 16.0, 110.0, 770.0);
    label(&layer, &font, "Mme/M. :", 11.0, 60.0, 696.0);
    label(&layer, &font, "Ne(e) le :", 11.0, 60.0, 674.0);
    label(&layer, &font, "a :", 11.0, 300.0, 674.0);
    label(&layer, &font, "Demeurant :", 11.0, 60.0, 652.0);

    for (reason, y) in crate::attestation::REASON_CHECKBOXES {
        label(&layer, &font, "[   ]", 11.0, REASON_CHECKBOX_X - 4.0, y + 2.0);
        label(&layer, &font, reason_label(reason), 10.0, REASON_CHECKBOX_X + 30.0, y + 4.0);
    }

    label(&layer, &font, "Fait a :", 11.0, 72.0, 175.0);
    label(&layer, &font, "Le :", 11.0, 72.0, 153.0);
    label(&layer, &font, "a :", 11.0, 255.0, 153.0);
    label(&layer, &font, "Signature :", 11.0, 72.0, 119.0);

    doc.save_to_bytes()
        .map_err(|e| anyhow!("Failed to serialize template: {:?}", e))
}
