//! Stock Image Selector
//!
//! Maps an industry to three keyword tiers, rotates the flattened term
//! list by page so consecutive regenerates lead with different queries,
//! and collects unseen candidates one per term.

use std::collections::HashSet;
use std::sync::Arc;

use crate::data::ContentKind;
use crate::metrics::STOCK_CANDIDATES_RETURNED;
use crate::providers::{CandidateImage, Orientation, StockPhotoProvider};

/// Terms advanced per page when rotating
const ROTATION_STEP: usize = 3;
/// Extra provider pages skipped by the broader fallback query
const FALLBACK_PAGE_OFFSET: u32 = 2;
/// Most results the provider will return for one query
const MAX_PER_PAGE: u32 = 30;

/// Search terms for one industry, most specific first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTiers {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub generic: Vec<String>,
}

impl KeywordTiers {
    fn from_static(primary: &[&str], secondary: &[&str], generic: &[&str]) -> Self {
        let owned = |terms: &[&str]| terms.iter().map(|term| term.to_string()).collect();
        Self {
            primary: owned(primary),
            secondary: owned(secondary),
            generic: owned(generic),
        }
    }

    /// `primary ++ secondary ++ generic`
    pub fn flatten(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(&self.secondary)
            .chain(&self.generic)
            .cloned()
            .collect()
    }
}

/// Keyword tiers for an industry, falling back to topic-derived terms
pub fn keyword_tiers(industry: &str, topic: &str) -> KeywordTiers {
    let normalized = industry.trim().to_ascii_lowercase();
    known_industry_tiers(&normalized).unwrap_or_else(|| {
        let label = if normalized.is_empty() {
            "small business".to_string()
        } else {
            normalized.clone()
        };
        KeywordTiers {
            primary: vec![topic_query(topic).unwrap_or_else(|| label.clone())],
            secondary: vec![format!("{label} professional"), format!("{label} work")],
            generic: vec![format!("{label} team")],
        }
    })
}

/// Flattened tiers rotated for `page` (1-based)
pub fn rotated_terms(tiers: &KeywordTiers, page: u32) -> Vec<String> {
    let mut terms = tiers.flatten();
    if terms.is_empty() {
        return terms;
    }
    let offset = ((page.max(1) as usize - 1) * ROTATION_STEP) % terms.len();
    terms.rotate_left(offset);
    terms
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "our", "your", "with", "new", "now", "are", "from", "this", "that",
    "into", "about", "what", "how", "why", "all", "its", "has", "have", "will", "you",
];

/// Short search query made of the topic's meaningful words
fn topic_query(topic: &str) -> Option<String> {
    let words: Vec<String> = topic
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 2 && !STOPWORDS.contains(&word.as_str()))
        .take(4)
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn known_industry_tiers(industry: &str) -> Option<KeywordTiers> {
    // Padded so short needles like " car " only match whole words
    let padded = format!(" {industry} ");
    let has = |needles: &[&str]| needles.iter().any(|needle| padded.contains(needle));

    let tiers = if has(&["restaurant", "cafe", "café", "bistro", "diner", "food", "catering"]) {
        KeywordTiers::from_static(
            &[
                "restaurant interior",
                "chef plating food",
                "dining table dishes",
                "restaurant patio",
                "fresh meal close up",
                "waiter serving",
            ],
            &[
                "friends eating dinner",
                "kitchen cooking",
                "cocktail bar",
                "coffee cup table",
                "fresh ingredients",
            ],
            &["food", "dining", "hospitality"],
        )
    } else if has(&["bakery", "pastry", "dessert"]) {
        KeywordTiers::from_static(
            &[
                "fresh bread loaves",
                "bakery display case",
                "croissants pastries",
                "baker kneading dough",
                "cupcakes frosting",
            ],
            &[
                "coffee and pastry",
                "flour baking",
                "cake decorating",
                "artisan bread",
                "breakfast table",
            ],
            &["bakery", "baking", "sweets"],
        )
    } else if has(&["salon", "hair", "barber", "beauty", " spa", "nail"]) {
        KeywordTiers::from_static(
            &[
                "hair salon interior",
                "hairstylist cutting hair",
                "barber shop",
                "manicure nails",
                "spa treatment",
                "makeup artist",
            ],
            &["beauty products", "relaxing spa", "hair styling", "skincare routine", "salon chair"],
            &["beauty", "self care", "wellness"],
        )
    } else if has(&["fitness", " gym", "yoga", "personal train", "pilates", "crossfit"]) {
        KeywordTiers::from_static(
            &[
                "gym workout",
                "personal trainer client",
                "yoga class",
                "weight training",
                "group fitness class",
                "running outdoors",
            ],
            &[
                "healthy lifestyle",
                "stretching exercise",
                "fitness equipment",
                "sports nutrition",
                "athlete training",
            ],
            &["fitness", "exercise", "health"],
        )
    } else if has(&["dental", "dentist", "orthodont"]) {
        KeywordTiers::from_static(
            &[
                "dentist patient",
                "dental clinic",
                "healthy smile",
                "dental checkup",
                "orthodontic braces",
            ],
            &[
                "toothbrush",
                "family smiling",
                "medical clinic interior",
                "dental hygiene",
                "friendly doctor",
            ],
            &["healthcare", "smile", "clinic"],
        )
    } else if has(&["medical", "health", "clinic", "doctor", "physio", "chiropract", "therapy"]) {
        KeywordTiers::from_static(
            &[
                "doctor consultation",
                "medical clinic",
                "nurse patient care",
                "physical therapy",
                "healthcare team",
            ],
            &[
                "stethoscope",
                "wellness checkup",
                "hospital hallway",
                "healthy senior",
                "medical technology",
            ],
            &["healthcare", "wellness", "medicine"],
        )
    } else if has(&["real estate", "realtor", "property", "realty", "mortgage"]) {
        KeywordTiers::from_static(
            &[
                "modern house exterior",
                "real estate agent keys",
                "home interior living room",
                "sold sign house",
                "new home buyers",
                "kitchen renovation",
            ],
            &[
                "neighborhood street",
                "apartment building",
                "house keys",
                "family moving in",
                "home office",
            ],
            &["home", "property", "architecture"],
        )
    } else if has(&[" law ", "law firm", "legal", "attorney", "lawyer"]) {
        KeywordTiers::from_static(
            &[
                "lawyer office",
                "legal documents signing",
                "courthouse",
                "attorney client meeting",
                "law books",
            ],
            &[
                "business handshake",
                "contract pen",
                "scales of justice",
                "professional meeting",
                "city office building",
            ],
            &["legal", "business", "office"],
        )
    } else if has(&["accountant", "accounting", "bookkeep", " tax", "financ", "insurance"]) {
        KeywordTiers::from_static(
            &[
                "accountant calculator",
                "financial planning",
                "tax documents",
                "business finance meeting",
                "spreadsheet laptop",
            ],
            &[
                "savings jar",
                "office desk",
                "business growth chart",
                "handshake deal",
                "small business owner",
            ],
            &["finance", "business", "money"],
        )
    } else if has(&[
        "plumb",
        "hvac",
        "electric",
        "handyman",
        "roofing",
        "contractor",
        "construction",
    ]) {
        KeywordTiers::from_static(
            &[
                "plumber fixing pipe",
                "electrician at work",
                "construction worker",
                "home repair tools",
                "hvac technician",
                "roof repair",
            ],
            &[
                "tool belt",
                "home renovation",
                "work van",
                "house maintenance",
                "blueprint planning",
            ],
            &["construction", "tools", "home improvement"],
        )
    } else if has(&["landscap", "garden", "lawn", " tree"]) {
        KeywordTiers::from_static(
            &[
                "landscaped garden",
                "lawn mowing",
                "gardener planting",
                "backyard patio design",
                "flower beds",
            ],
            &[
                "green lawn",
                "garden tools",
                "outdoor living space",
                "hedge trimming",
                "spring flowers",
            ],
            &["garden", "nature", "outdoors"],
        )
    } else if has(&[" auto", " car ", " cars", "car repair", "mechanic", "vehicle", "garage"]) {
        KeywordTiers::from_static(
            &["auto mechanic", "car repair shop", "oil change", "tire service", "car detailing"],
            &["car engine", "garage tools", "new car dealership", "road trip", "car wash"],
            &["automotive", "cars", "vehicle"],
        )
    } else if has(&["retail", "boutique", "shop", "store", "fashion", "clothing"]) {
        KeywordTiers::from_static(
            &[
                "boutique interior",
                "clothing rack",
                "shopping bags",
                "store display",
                "customer shopping",
                "fashion accessories",
            ],
            &[
                "small shop owner",
                "gift wrapping",
                "product flat lay",
                "sale sign",
                "window display",
            ],
            &["shopping", "retail", "fashion"],
        )
    } else if has(&["hotel", "travel", " inn", "bed and breakfast", "tourism", "resort"]) {
        KeywordTiers::from_static(
            &[
                "hotel room",
                "hotel lobby",
                "resort pool",
                "travel destination",
                "bed and breakfast",
            ],
            &[
                "suitcase travel",
                "room service breakfast",
                "scenic view",
                "vacation couple",
                "concierge desk",
            ],
            &["travel", "vacation", "hospitality"],
        )
    } else if has(&[" pet", "veterinar", " dog", "grooming"]) {
        KeywordTiers::from_static(
            &["veterinarian with dog", "pet grooming", "happy dog", "cat at vet", "dog walking"],
            &["pet supplies", "puppy playing", "pet owner", "animal clinic", "dog park"],
            &["pets", "animals", "dogs"],
        )
    } else if has(&["tech", "software", " it ", "saas", "agency", "marketing", "consult"]) {
        KeywordTiers::from_static(
            &[
                "team working laptops",
                "office collaboration",
                "software developer",
                "startup office",
                "business presentation",
            ],
            &[
                "coworking space",
                "video call",
                "whiteboard brainstorming",
                "modern office",
                "laptop coffee",
            ],
            &["technology", "business", "teamwork"],
        )
    } else if has(&["clean", "maid", "janitor"]) {
        KeywordTiers::from_static(
            &[
                "house cleaning",
                "cleaning supplies",
                "professional cleaner",
                "spotless kitchen",
                "office cleaning",
            ],
            &[
                "fresh laundry",
                "vacuum cleaner",
                "tidy living room",
                "mopping floor",
                "organized home",
            ],
            &["cleaning", "home", "service"],
        )
    } else if has(&["school", "tutor", "education", "daycare", "learning"]) {
        KeywordTiers::from_static(
            &[
                "tutor with student",
                "classroom learning",
                "kids reading",
                "teacher whiteboard",
                "study group",
            ],
            &[
                "books stack",
                "school supplies",
                "online learning",
                "graduation",
                "children playing",
            ],
            &["education", "learning", "school"],
        )
    } else {
        return None;
    };

    Some(tiers)
}

/// Stock image selector service
pub struct StockImageSelector {
    provider: Arc<dyn StockPhotoProvider>,
    batch_size: u32,
}

impl StockImageSelector {
    pub fn new(provider: Arc<dyn StockPhotoProvider>, batch_size: u32) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn StockPhotoProvider> {
        &self.provider
    }

    /// Select up to `count` unseen stock candidates
    ///
    /// Provider errors are swallowed per term; running out of terms just
    /// yields fewer candidates.
    pub async fn select(
        &self,
        topic: &str,
        industry: &str,
        kind: ContentKind,
        page: u32,
        excluded_urls: &HashSet<String>,
        count: usize,
    ) -> Vec<CandidateImage> {
        let page = page.max(1);
        let orientation = Orientation::for_kind(kind);
        let tiers = keyword_tiers(industry, topic);
        let terms = rotated_terms(&tiers, page);

        let mut accepted: Vec<CandidateImage> = Vec::with_capacity(count);
        let mut seen: HashSet<String> = excluded_urls.clone();

        for term in &terms {
            if accepted.len() >= count {
                break;
            }
            let results = self.search(term, orientation, page, self.batch_size).await;
            if let Some(candidate) = results.into_iter().find(|c| !seen.contains(&c.url)) {
                seen.insert(candidate.url.clone());
                accepted.push(candidate);
            }
        }

        if accepted.len() < count {
            if let Some(broad_term) = tiers.primary.first() {
                let needed = (count - accepted.len()) as u32;
                let per_page = (needed * self.batch_size).clamp(1, MAX_PER_PAGE);
                let results = self
                    .search(broad_term, orientation, page + FALLBACK_PAGE_OFFSET, per_page)
                    .await;
                for candidate in results {
                    if accepted.len() >= count {
                        break;
                    }
                    if seen.insert(candidate.url.clone()) {
                        accepted.push(candidate);
                    }
                }
            }
        }

        STOCK_CANDIDATES_RETURNED.observe(accepted.len() as f64);
        tracing::debug!(
            industry,
            page,
            terms = terms.len(),
            returned = accepted.len(),
            "Stock selection finished"
        );
        accepted
    }

    async fn search(
        &self,
        term: &str,
        orientation: Orientation,
        page: u32,
        per_page: u32,
    ) -> Vec<CandidateImage> {
        match self.provider.search(term, orientation, page, per_page).await {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(term, %error, "Stock query failed; trying next term");
                Vec::new()
            }
        }
    }
}
