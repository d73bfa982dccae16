use super::{ContentService, TransportError};
use crate::models::{GenerateRequest, GenerateResponse, ScrapeRequest, ScrapeResponse};
use crate::wizard::intake::validate_listing_url;
use crate::wizard::property::PropertyRecord;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{Datelike, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::info;

const DEMO_IMAGE_COUNT: usize = 12;
const MAX_HASHTAGS: usize = 30;

const BASE_HASHTAGS: [&str; 10] = [
    "#realestate",
    "#realtor",
    "#homesforsale",
    "#househunting",
    "#dreamhome",
    "#realestateagent",
    "#newlisting",
    "#property",
    "#realty",
    "#homesweethome",
];

/// Offline stand-in for the scrape/generate service. Image URLs are derived
/// from the listing id and the "post" is a fixed JPEG-framed payload.
#[derive(Default)]
pub struct DemoContentService {
    sessions: Mutex<HashMap<String, Vec<String>>>,
}

impl DemoContentService {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_images(&self, session_id: &str) -> Option<Vec<String>> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(session_id).cloned())
    }
}

#[async_trait]
impl ContentService for DemoContentService {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, TransportError> {
        let listing_url = validate_listing_url(&request.listing_url)
            .map_err(|err| TransportError::rejected(422, err.detail()))?;
        let listing_id = listing_id(&listing_url)
            .ok_or_else(|| TransportError::rejected(404, "No images found in listing"))?;
        let images: Vec<String> = (1..=DEMO_IMAGE_COUNT)
            .map(|n| format!("https://cdn.aryeo.com/listings/{listing_id}/photo-{n:02}.jpg"))
            .collect();
        let session_id = format!(
            "session_{}_{}",
            Utc::now().timestamp(),
            rand::rng().random_range(0..10_000)
        );
        self.sessions
            .lock()
            .map_err(|_| TransportError::Http("demo session store poisoned".into()))?
            .insert(session_id.clone(), images.clone());
        info!(
            target = "realtypost.collaborator",
            session_id = %session_id,
            images = images.len(),
            "demo scrape"
        );
        Ok(ScrapeResponse {
            session_id,
            total_found: Some(images.len()),
            images,
        })
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TransportError> {
        let images = self
            .session_images(&request.session_id)
            .ok_or_else(|| TransportError::rejected(404, "Session not found or expired"))?;
        if request.detail_images.len() != 3 {
            return Err(TransportError::rejected(
                422,
                "Exactly 3 detail images are required",
            ));
        }
        if !images.iter().any(|i| i == request.hero_image_url.as_str()) {
            return Err(TransportError::rejected(400, "Failed to load hero image"));
        }
        for (idx, detail) in request.detail_images.iter().enumerate() {
            if !images.iter().any(|i| i == detail.as_str()) {
                return Err(TransportError::rejected(
                    400,
                    format!("Failed to load detail image {}", idx + 1),
                ));
            }
        }
        let current_year = Utc::now().year();
        Ok(GenerateResponse {
            image_base64: STANDARD.encode(placeholder_jpeg(&request.session_id)),
            caption: caption(&request.property_info, current_year),
            hashtags: hashtags(&request.property_info),
        })
    }

    async fn release(&self, session_id: &str) -> Result<(), TransportError> {
        let removed = self
            .sessions
            .lock()
            .map_err(|_| TransportError::Http("demo session store poisoned".into()))?
            .remove(session_id);
        match removed {
            Some(_) => Ok(()),
            None => Err(TransportError::rejected(404, "Session not found")),
        }
    }
}

fn listing_id(listing_url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(listing_url).ok()?;
    parsed
        .path_segments()?
        .rfind(|segment| !segment.is_empty())
        .map(str::to_string)
}

// SOI marker, a comment segment naming the session, EOI marker.
fn placeholder_jpeg(session_id: &str) -> Vec<u8> {
    let comment = format!("realtypost demo post {session_id}");
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xFE];
    let length = (comment.len() + 2).min(u16::MAX as usize) as u16;
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(comment.as_bytes());
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

fn price_number(price: &str) -> u64 {
    let digits: String = price.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(u64::MAX)
}

fn group_thousands(value: u32) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (idx, ch) in raw.chars().enumerate() {
        if idx > 0 && (raw.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn caption(property: &PropertyRecord, current_year: i32) -> String {
    let price_num = price_number(&property.price);
    let price_display = if price_num >= 1_000_000 {
        format!("${:.2}M", price_num as f64 / 1_000_000.0)
    } else {
        property.price.clone()
    };

    let mut features = Vec::new();
    if let Some(year) = property.year_built {
        let age = current_year - year;
        if age <= 5 {
            features.push("newly built".to_string());
        } else if age <= 15 {
            features.push("modern construction".to_string());
        }
    }
    if property.square_feet >= 3000 {
        features.push("spacious layout".to_string());
    }
    if property.bedrooms >= 4 {
        features.push("perfect for families".to_string());
    }
    if let Some(lot) = &property.lot_size {
        features.push(format!("{lot} lot"));
    }

    let mut caption = format!(
        "🏡 NEW LISTING ALERT! 🏡\n\n{price_display}\n{} Bedrooms | {} Bathrooms | {} sqft\n\n📍 {}\n{}, {} {}",
        property.bedrooms,
        property.bathrooms,
        group_thousands(property.square_feet),
        property.address,
        property.city,
        property.state,
        property.zip_code,
    );
    if !features.is_empty() {
        caption.push_str(&format!("\n\n✨ Features: {}", features.join(", ")));
    }
    caption.push_str(&format!(
        "\n\nThis stunning {} offers everything you've been looking for! \
         Don't miss this incredible opportunity to make it yours.\
         \n\n💬 DM for more details or to schedule your private showing!\
         \n🔗 Link in bio for virtual tour\
         \n\n👉 Tag someone who needs to see this!",
        property.property_type.label().to_lowercase()
    ));
    caption
}

fn hashtags(property: &PropertyRecord) -> Vec<String> {
    let mut tags: Vec<String> = BASE_HASHTAGS.iter().map(|t| t.to_string()).collect();
    tags.push(format!(
        "#{}",
        property.city.to_lowercase().replace([' ', '-'], "")
    ));
    tags.push(format!("#{}realestate", property.state.to_lowercase()));
    tags.push(format!(
        "#{}",
        property.property_type.label().to_lowercase().replace(' ', "")
    ));

    let price_num = price_number(&property.price);
    let tier: &[&str] = if price_num >= 1_000_000 {
        &["#luxuryhomes", "#luxuryrealestate", "#luxuryliving"]
    } else if price_num >= 500_000 {
        &["#premiumhomes", "#upscalehomes"]
    } else {
        &["#affordablehomes", "#firsttimehomebuyer"]
    };
    tags.extend(tier.iter().map(|t| t.to_string()));
    if property.square_feet >= 3000 {
        tags.push("#spacioushome".into());
    }
    if property.bedrooms >= 4 {
        tags.push("#familyhome".into());
    }

    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .take(MAX_HASHTAGS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRef;
    use crate::wizard::property::PropertyDraft;

    fn record(price: &str, bedrooms: &str, sqft: &str, year: &str) -> PropertyRecord {
        PropertyDraft {
            price: price.into(),
            bedrooms: bedrooms.into(),
            bathrooms: "2.5".into(),
            square_feet: sqft.into(),
            address: "12 Harbor Way".into(),
            city: "San Luis Obispo".into(),
            state: "ca".into(),
            zip_code: "93401".into(),
            year_built: year.into(),
            lot_size: "0.25 acres".into(),
            ..PropertyDraft::default()
        }
        .validate(2025)
        .unwrap()
    }

    async fn scraped(service: &DemoContentService) -> ScrapeResponse {
        service
            .scrape(&ScrapeRequest {
                listing_url: "https://example.aryeo.com/listings/abc-123/".into(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn scrape_is_deterministic_per_listing() {
        let service = DemoContentService::new();
        let first = scraped(&service).await;
        let second = scraped(&service).await;
        assert!(first.session_id.starts_with("session_"));
        assert_eq!(first.images, second.images);
        assert_eq!(first.images.len(), DEMO_IMAGE_COUNT);
        assert_eq!(
            first.images[0],
            "https://cdn.aryeo.com/listings/abc-123/photo-01.jpg"
        );
    }

    #[tokio::test]
    async fn scrape_rejects_foreign_domains() {
        let service = DemoContentService::new();
        let err = service
            .scrape(&ScrapeRequest {
                listing_url: "https://example.com/listings/1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::rejected(422, "URL must be from aryeo.com domain")
        );
    }

    #[tokio::test]
    async fn generate_requires_live_session() {
        let service = DemoContentService::new();
        let request = GenerateRequest {
            session_id: "session_0_0".into(),
            hero_image_url: ImageRef::from("a.jpg"),
            detail_images: vec!["b.jpg".into(), "c.jpg".into(), "d.jpg".into()],
            property_info: record("$450,000", "3", "1800", ""),
        };
        let err = service.generate(&request).await.unwrap_err();
        assert_eq!(err.user_message(""), "Session not found or expired");
    }

    #[tokio::test]
    async fn generate_then_release() {
        let service = DemoContentService::new();
        let scrape = scraped(&service).await;
        let request = GenerateRequest {
            session_id: scrape.session_id.clone(),
            hero_image_url: ImageRef::from(scrape.images[0].as_str()),
            detail_images: scrape.images[1..4].iter().map(|s| ImageRef::from(s.as_str())).collect(),
            property_info: record("$1,250,000", "4", "3200", "2022"),
        };
        let response = service.generate(&request).await.unwrap();
        let bytes = STANDARD.decode(&response.image_base64).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
        assert!(response.caption.contains("$1.25M"));
        assert!(response.hashtags.contains(&"#luxuryhomes".to_string()));

        service.release(&scrape.session_id).await.unwrap();
        assert!(service.generate(&request).await.is_err());
        assert!(service.release(&scrape.session_id).await.is_err());
    }

    #[tokio::test]
    async fn generate_rejects_images_outside_session() {
        let service = DemoContentService::new();
        let scrape = scraped(&service).await;
        let request = GenerateRequest {
            session_id: scrape.session_id,
            hero_image_url: ImageRef::from(scrape.images[0].as_str()),
            detail_images: vec![
                ImageRef::from(scrape.images[1].as_str()),
                ImageRef::from("elsewhere.jpg"),
                ImageRef::from(scrape.images[2].as_str()),
            ],
            property_info: record("$450,000", "3", "1800", ""),
        };
        let err = service.generate(&request).await.unwrap_err();
        assert_eq!(err, TransportError::rejected(400, "Failed to load detail image 2"));
    }

    #[test]
    fn caption_lists_features() {
        let text = caption(&record("$1,250,000", "4", "3200", "2022"), 2025);
        assert!(text.starts_with("🏡 NEW LISTING ALERT! 🏡\n\n$1.25M\n"));
        assert!(text.contains("4 Bedrooms | 2.5 Bathrooms | 3,200 sqft"));
        assert!(text.contains("San Luis Obispo, CA 93401"));
        assert!(text.contains(
            "✨ Features: newly built, spacious layout, perfect for families, 0.25 acres lot"
        ));
        assert!(text.contains("This stunning single family home offers"));
    }

    #[test]
    fn caption_keeps_price_below_a_million() {
        let text = caption(&record("$450,000", "2", "900", "2000"), 2025);
        assert!(text.contains("\n\n$450,000\n"));
        assert!(!text.contains("newly built"));
        assert!(!text.contains("modern construction"));
    }

    #[test]
    fn hashtags_are_unique_and_tiered() {
        let tags = hashtags(&record("$650,000", "4", "1800", ""));
        assert_eq!(&tags[..2], &["#realestate", "#realtor"]);
        for expected in [
            "#sanluisobispo",
            "#carealestate",
            "#singlefamilyhome",
            "#premiumhomes",
            "#familyhome",
        ] {
            assert!(tags.contains(&expected.to_string()), "{expected}");
        }
        assert!(!tags.contains(&"#spacioushome".to_string()));
        let unique: HashSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(950), "950");
        assert_eq!(group_thousands(3200), "3,200");
        assert_eq!(group_thousands(1_000_000), "1,000,000");
    }
}
