//! Filling the attestation template.
//!
//! Field positions are fixed PDF user-space coordinates (origin bottom-left,
//! text positioned at its baseline) matching the official form.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use lopdf::Document;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::{DATE_FMT, Outing, Profile, ReasonKey, TIME_FMT};
use crate::fit::{ideal_font_size, MeasureText};
use crate::pdf::content::{add_qr_image, ContentBuilder};
use crate::pdf::document::{append_blank_page, first_page, save_to_bytes};
use crate::pdf::fonts::{find_unicode_font, is_winansi_encodable, LabelFont, HELVETICA};
use crate::pdf::resources::update_page_resources;

pub const DEFAULT_FONT_SIZE: u32 = 11;
pub const SMALL_FONT_SIZE: u32 = 7;
pub const CHECK_MARK: &str = "×";
pub const CHECK_MARK_SIZE: u32 = 20;

pub const REASON_CHECKBOX_X: f64 = 77.0;
pub const REASON_CHECKBOXES: [(ReasonKey, f64); 9] = [
    (ReasonKey::Travail, 577.0),
    (ReasonKey::Achats, 532.0),
    (ReasonKey::Sante, 476.0),
    (ReasonKey::Famille, 435.0),
    (ReasonKey::Handicap, 394.0),
    (ReasonKey::SportAnimaux, 356.0),
    (ReasonKey::Convocation, 293.0),
    (ReasonKey::Missions, 254.0),
    (ReasonKey::Enfants, 209.0),
];

/// Width available for the "Fait à" city
pub const CITY_MAX_WIDTH: f64 = 83.0;
pub const CITY_MIN_SIZE: u32 = 7;

const CREATED_LABEL: &str = "Date de création:";

/// Size and position of the QR code on page 1, measured from the right edge
const QR_RIGHT_OFFSET: f64 = 160.0;
const QR_Y: f64 = 125.0;
const QR_SIDE: f64 = 80.0;

/// Size and position of the QR code on page 2, measured from the top edge
const BIG_QR_X: f64 = 50.0;
const BIG_QR_TOP_OFFSET: f64 = 350.0;
const BIG_QR_SIDE: f64 = 300.0;

/// Everything printed on one attestation
#[derive(Debug, Clone)]
pub struct AttestationRequest<'a> {
    pub profile: &'a Profile,
    pub reasons: &'a [ReasonKey],
    pub outing: Outing,
    pub created: NaiveDateTime,
}

/// A piece of text stamped at a fixed position
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub size: u32,
}

impl Label {
    fn new(text: impl Into<String>, x: f64, y: f64, size: u32) -> Self {
        Self { text: text.into(), x, y, size }
    }
}

impl AttestationRequest<'_> {
    fn created_date(&self) -> String {
        self.created.format(DATE_FMT).to_string()
    }

    fn created_time(&self) -> String {
        self.created.format(TIME_FMT).to_string()
    }

    /// Text encoded in the QR code
    pub fn qr_payload(&self) -> String {
        let p = self.profile;
        let reasons: Vec<&str> = self.reasons.iter().map(|r| r.key()).collect();
        [
            format!("Cree le: {} a {}", self.created_date(), self.created_time()),
            format!("Nom: {}", p.last_name),
            format!("Prenom: {}", p.first_name),
            format!("Naissance: {} a {}", p.date_of_birth.formatted(), p.place_of_birth),
            format!("Adresse: {} {} {}", p.address, p.zip, p.city),
            format!("Sortie: {} a {}", self.outing.date_str(), self.outing.time_str()),
            format!("Motifs: {}", reasons.join(", ")),
        ]
        .join(";\n ")
    }

    /// Every string that will be stamped, used to pick a font
    fn all_texts(&self) -> Vec<String> {
        let p = self.profile;
        vec![
            p.full_name(),
            p.date_of_birth.formatted(),
            p.place_of_birth.clone(),
            format!("{}, {} {}", p.address, p.zip, p.city),
            CHECK_MARK.to_string(),
            self.outing.date_str(),
            self.outing.time_str(),
            CREATED_LABEL.to_string(),
            format!("{} à {}", self.created_date(), self.created_time()),
        ]
    }

    /// Labels of the first page, with the city sized to fit its box
    pub fn page_one_labels<M: MeasureText>(&self, font: &M) -> Vec<Label> {
        let p = self.profile;
        let mut labels = vec![
            Label::new(p.full_name(), 135.0, 696.0, DEFAULT_FONT_SIZE),
            Label::new(p.date_of_birth.formatted(), 135.0, 674.0, DEFAULT_FONT_SIZE),
            Label::new(p.place_of_birth.clone(), 320.0, 674.0, DEFAULT_FONT_SIZE),
            Label::new(format!("{}, {} {}", p.address, p.zip, p.city), 135.0, 652.0, DEFAULT_FONT_SIZE),
        ];

        for (reason, y) in REASON_CHECKBOXES {
            if self.reasons.contains(&reason) {
                labels.push(Label::new(CHECK_MARK, REASON_CHECKBOX_X, y, CHECK_MARK_SIZE));
            }
        }

        labels.extend([
            Label::new(p.city.clone(), 111.0, 175.0, city_font_size(font, &p.city)),
            Label::new(self.outing.date_str(), 111.0, 153.0, DEFAULT_FONT_SIZE),
            Label::new(self.outing.time_str(), 275.0, 153.0, DEFAULT_FONT_SIZE),
            Label::new(p.full_name(), 130.0, 119.0, DEFAULT_FONT_SIZE),
            Label::new(CREATED_LABEL, 464.0, 110.0, SMALL_FONT_SIZE),
            Label::new(
                format!("{} à {}", self.created_date(), self.created_time()),
                455.0,
                104.0,
                SMALL_FONT_SIZE,
            ),
        ]);
        labels
    }
}

pub const CITY_TOO_LONG_WARNING: &str =
    "Le nom de la ville risque de ne pas être affiché correctement en raison de sa longueur. \
     Essayez d'utiliser des abréviations (\"Saint\" en \"St.\" par exemple) quand cela est possible.";

/// Size for the city label, falling back to the minimum with a warning
pub fn city_font_size<M: MeasureText + ?Sized>(font: &M, city: &str) -> u32 {
    match ideal_font_size(font, city, CITY_MAX_WIDTH, CITY_MIN_SIZE, DEFAULT_FONT_SIZE) {
        Some(size) => size,
        None => {
            warn!(city, "{}", CITY_TOO_LONG_WARNING);
            CITY_MIN_SIZE
        }
    }
}

/// Pick Helvetica when everything fits WinAnsi, else a system Unicode font
pub fn choose_font(texts: &[String]) -> LabelFont {
    if texts.iter().all(|t| is_winansi_encodable(t)) {
        return LabelFont::Standard(HELVETICA);
    }

    let combined = texts.concat();
    match find_unicode_font(&combined) {
        Some(font) => {
            info!(family = font.family(), "Profile needs characters outside WinAnsi, embedding system font");
            LabelFont::Unicode(font)
        }
        None => {
            warn!("No system font covers the profile text; unsupported characters will print as '?'");
            LabelFont::Standard(HELVETICA)
        }
    }
}

/// Fill `template` and return the two-page attestation as PDF bytes
pub fn generate_attestation(template: &[u8], request: &AttestationRequest<'_>) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(template)
        .with_context(|| "Failed to load template PDF")?;
    let (page1_id, geometry) = first_page(&doc)?;
    debug!(width = geometry.width, height = geometry.height, "Loaded template");

    let texts = request.all_texts();
    let font = choose_font(&texts);
    let used_chars: BTreeSet<char> = texts.iter().flat_map(|t| t.chars()).collect();
    let font_id = font.embed(&mut doc, &used_chars)?;

    let qr_id = add_qr_image(&mut doc, &request.qr_payload())?;

    let mut page1 = ContentBuilder::new(&font);
    for label in request.page_one_labels(&font) {
        page1.draw_text(&label.text, label.x, label.y, label.size);
    }
    page1.draw_image(qr_id, geometry.width - QR_RIGHT_OFFSET, QR_Y, QR_SIDE, QR_SIDE);
    doc.add_page_contents(page1_id, page1.build_content_bytes())?;
    update_page_resources(&mut doc, page1_id, font.resource_name(), font_id, &page1.xobjects);

    let page2_id = append_blank_page(&mut doc, page1_id)?;
    let mut page2 = ContentBuilder::new(&font);
    page2.draw_image(
        qr_id,
        BIG_QR_X,
        geometry.height - BIG_QR_TOP_OFFSET,
        BIG_QR_SIDE,
        BIG_QR_SIDE,
    );
    doc.add_page_contents(page2_id, page2.build_content_bytes())?;
    update_page_resources(&mut doc, page2_id, font.resource_name(), font_id, &page2.xobjects);

    save_to_bytes(&mut doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BirthDate;
    use crate::pdf::template::blank_template;
    use chrono::NaiveDate;

    fn profile(city: &str) -> Profile {
        Profile {
            first_name: "Jean".to_string(),
            last_name: "Dupont".to_string(),
            date_of_birth: BirthDate::parse("1970-01-31").unwrap(),
            place_of_birth: "Lyon".to_string(),
            address: "1 rue de la Paix".to_string(),
            city: city.to_string(),
            zip: "75002".to_string(),
        }
    }

    fn request<'a>(profile: &'a Profile, reasons: &'a [ReasonKey]) -> AttestationRequest<'a> {
        let created = NaiveDate::from_ymd_opt(2020, 11, 2)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        let outing = Outing::from_parts(Some("02/11/2020"), Some("10h30"), created).unwrap();
        AttestationRequest { profile, reasons, outing, created }
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle.as_bytes())
    }

    #[test]
    fn test_qr_payload() {
        let profile = profile("Paris");
        let reasons = [ReasonKey::Travail, ReasonKey::SportAnimaux];
        let payload = request(&profile, &reasons).qr_payload();
        assert_eq!(
            payload,
            "Cree le: 02/11/2020 a 09h05;\n \
             Nom: Dupont;\n \
             Prenom: Jean;\n \
             Naissance: 31/01/1970 a Lyon;\n \
             Adresse: 1 rue de la Paix 75002 Paris;\n \
             Sortie: 02/11/2020 a 10h30;\n \
             Motifs: travail, sport_animaux"
        );
    }

    #[test]
    fn test_page_one_labels_check_selected_reasons() {
        let profile = profile("Paris");
        let reasons = [ReasonKey::Enfants, ReasonKey::Achats];
        let labels = request(&profile, &reasons).page_one_labels(&HELVETICA);

        let checks: Vec<f64> = labels.iter().filter(|l| l.text == CHECK_MARK).map(|l| l.y).collect();
        assert_eq!(checks, vec![532.0, 209.0]);
        assert!(labels.iter().filter(|l| l.text == CHECK_MARK).all(|l| l.x == 77.0 && l.size == 20));
    }

    #[test]
    fn test_page_one_labels_positions() {
        let profile = profile("Paris");
        let labels = request(&profile, &[]).page_one_labels(&HELVETICA);
        assert_eq!(labels[0], Label::new("Jean Dupont", 135.0, 696.0, 11));
        assert_eq!(labels[3], Label::new("1 rue de la Paix, 75002 Paris", 135.0, 652.0, 11));
        assert!(labels.contains(&Label::new("Paris", 111.0, 175.0, 11)));
        assert!(labels.contains(&Label::new("10h30", 275.0, 153.0, 11)));
        assert!(labels.contains(&Label::new("02/11/2020 à 09h05", 455.0, 104.0, 7)));
    }

    #[test]
    fn test_long_city_is_shrunk() {
        let measure = |_: &str, size: u32| size as f64 * 8.0;
        assert_eq!(city_font_size(&measure, "Anywhere"), 10);
    }

    #[test]
    fn test_city_without_fit_falls_back_to_minimum() {
        let measure = |_: &str, size: u32| size as f64 * 20.0;
        assert_eq!(city_font_size(&measure, "Anywhere"), CITY_MIN_SIZE);
        assert!(CITY_TOO_LONG_WARNING.starts_with("Le nom de la ville risque"));
        assert!(CITY_TOO_LONG_WARNING.contains("(\"Saint\" en \"St.\" par exemple)"));
    }

    #[test]
    fn test_choose_font_outside_bmp_falls_back_to_helvetica() {
        let texts = vec!["𠮷野家".to_string()];
        assert!(matches!(choose_font(&texts), LabelFont::Standard(_)));
    }

    #[test]
    fn test_choose_font_for_french_text() {
        let texts = vec!["Saint-Étienne".to_string(), "×".to_string()];
        assert!(matches!(choose_font(&texts), LabelFont::Standard(_)));
    }

    #[test]
    fn test_generate_attestation() {
        let template = blank_template().unwrap();
        let profile = profile("Villefranche-sur-Saône");
        let reasons = [ReasonKey::Sante];
        let bytes = generate_attestation(&template, &request(&profile, &reasons)).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let page1 = doc.get_page_content(pages[&1]).unwrap();
        assert!(contains(&page1, "/FAtt 11 Tf 135 696 Td (Jean Dupont) Tj"));
        assert!(contains(&page1, "/FAtt 20 Tf 77 476 Td (\\327) Tj"));
        // 22 glyphs of Helvetica only fit 83pt at size 8
        assert!(contains(&page1, "/FAtt 8 Tf 111 175 Td (Villefranche-sur-Sa\\364ne) Tj"));
        assert!(contains(&page1, "cm /Im"));

        let page2 = doc.get_page_content(pages[&2]).unwrap();
        assert!(contains(&page2, "q 300 0 0 300 50 "));

        for page_id in pages.values() {
            let resources = doc.get_dictionary(*page_id)
                .unwrap()
                .get(b"Resources")
                .unwrap()
                .as_dict()
                .unwrap();
            assert!(resources.get(b"Font").unwrap().as_dict().unwrap().has(b"FAtt"));
            assert_eq!(resources.get(b"XObject").unwrap().as_dict().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_generate_rejects_garbage_template() {
        let profile = profile("Paris");
        assert!(generate_attestation(b"not a pdf", &request(&profile, &[])).is_err());
    }
}
