//! AI image style resolution
//!
//! An explicit, valid style always wins. Otherwise a style is drawn at
//! random, weighted by topic, industry and content kind, with the
//! business's preferred styles boosted and avoided styles removed.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::data::{Business, ContentKind, ImageStyle};

const BASE_WEIGHT: u32 = 2;
const AFFINITY_BOOST: u32 = 3;
const PREFERRED_MULTIPLIER: u32 = 3;

/// Per-business style preferences, passed in explicitly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StylePreferences {
    pub preferred: Vec<ImageStyle>,
    pub avoided: Vec<ImageStyle>,
}

impl StylePreferences {
    /// Unrecognised names in the stored lists are ignored
    pub fn from_business(business: &Business) -> Self {
        let parse = |names: Vec<String>| {
            names
                .iter()
                .filter_map(|name| ImageStyle::parse(name))
                .collect::<Vec<_>>()
        };
        Self {
            preferred: parse(business.preferred_style_names()),
            avoided: parse(business.avoided_style_names()),
        }
    }
}

fn topic_affinities(topic: &str) -> Vec<ImageStyle> {
    let topic = topic.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|word| topic.contains(word));

    let mut styles = Vec::new();
    if mentions(&["event", "party", "sale", "celebrat", "festival", "launch", "grand opening"]) {
        styles.push(ImageStyle::Vibrant);
    }
    if mentions(&["menu", "recipe", "product", "collection", "dish", "ingredient"]) {
        styles.push(ImageStyle::FlatLay);
    }
    if mentions(&["team", "staff", "customer", "community", "family", "meet"]) {
        styles.push(ImageStyle::Lifestyle);
    }
    if mentions(&["tip", "guide", "how to", "checklist", "steps", "explain"]) {
        styles.push(ImageStyle::Illustration);
    }
    if mentions(&["story", "behind the scenes", "announce", "opening", "open"]) {
        styles.push(ImageStyle::Cinematic);
    }
    styles
}

fn industry_affinities(industry: &str) -> &'static [ImageStyle] {
    let industry = industry.to_lowercase();
    let is = |words: &[&str]| words.iter().any(|word| industry.contains(word));

    if is(&["restaurant", "cafe", "bakery", "food", "catering"]) {
        &[ImageStyle::Lifestyle, ImageStyle::FlatLay]
    } else if is(&["salon", "beauty", "spa", "fashion", "boutique"]) {
        &[ImageStyle::Editorial, ImageStyle::Minimalist]
    } else if is(&["tech", "software", "consult", "agency", "account", "law", "legal"]) {
        &[ImageStyle::Minimalist, ImageStyle::Illustration]
    } else if is(&["fitness", "gym", "yoga"]) {
        &[ImageStyle::Vibrant, ImageStyle::Cinematic]
    } else if is(&["real estate", "realtor", "hotel", "travel"]) {
        &[ImageStyle::Photorealistic, ImageStyle::Cinematic]
    } else if is(&["retail", "shop", "store"]) {
        &[ImageStyle::FlatLay, ImageStyle::Vibrant]
    } else {
        &[ImageStyle::Photorealistic]
    }
}

fn kind_affinities(kind: ContentKind) -> &'static [ImageStyle] {
    match kind {
        ContentKind::BlogPost => &[ImageStyle::Editorial],
        ContentKind::SocialPost | ContentKind::SocialPack => {
            &[ImageStyle::Vibrant, ImageStyle::Lifestyle]
        }
        ContentKind::BusinessUpdate => &[ImageStyle::Photorealistic],
        ContentKind::Email => &[ImageStyle::Minimalist],
        ContentKind::ReviewReply => &[],
    }
}

/// Weight of every style for this request; avoided styles get zero
fn style_weights(
    topic: &str,
    industry: &str,
    kind: ContentKind,
    preferences: &StylePreferences,
) -> Vec<(ImageStyle, u32)> {
    let topic_styles = topic_affinities(topic);
    let industry_styles = industry_affinities(industry);
    let kind_styles = kind_affinities(kind);

    ImageStyle::ALL
        .into_iter()
        .map(|style| {
            if preferences.avoided.contains(&style) {
                return (style, 0);
            }
            let mut weight = BASE_WEIGHT;
            for matched in [
                topic_styles.contains(&style),
                industry_styles.contains(&style),
                kind_styles.contains(&style),
            ] {
                if matched {
                    weight += AFFINITY_BOOST;
                }
            }
            if preferences.preferred.contains(&style) {
                weight *= PREFERRED_MULTIPLIER;
            }
            (style, weight)
        })
        .collect()
}

/// Pick the image style for one AI generation
pub fn resolve_style<R: Rng + ?Sized>(
    explicit: Option<&str>,
    topic: &str,
    industry: &str,
    kind: ContentKind,
    preferences: &StylePreferences,
    rng: &mut R,
) -> ImageStyle {
    if let Some(style) = explicit.and_then(ImageStyle::parse) {
        return style;
    }
    if let Some(requested) = explicit {
        tracing::debug!(requested, "Ignoring unknown image style; auto-detecting");
    }

    let weights = style_weights(topic, industry, kind, preferences);
    match WeightedIndex::new(weights.iter().map(|(_, weight)| *weight)) {
        Ok(distribution) => weights[distribution.sample(rng)].0,
        // Every style avoided
        Err(_) => ImageStyle::Photorealistic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn explicit_style_wins_even_when_avoided() {
        let preferences = StylePreferences {
            preferred: vec![],
            avoided: vec![ImageStyle::Illustration],
        };
        let mut rng = StdRng::seed_from_u64(7);
        let style = resolve_style(
            Some("illustration"),
            "spring menu",
            "restaurant",
            ContentKind::BlogPost,
            &preferences,
            &mut rng,
        );
        assert_eq!(style, ImageStyle::Illustration);
    }

    #[test]
    fn avoided_styles_are_never_drawn() {
        let preferences = StylePreferences {
            preferred: vec![],
            avoided: vec![ImageStyle::Lifestyle, ImageStyle::FlatLay, ImageStyle::Vibrant],
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let style = resolve_style(
                Some("watercolor"),
                "menu party for the team",
                "restaurant",
                ContentKind::SocialPost,
                &preferences,
                &mut rng,
            );
            assert!(!preferences.avoided.contains(&style));
        }
    }

    #[test]
    fn all_avoided_falls_back_to_photorealistic() {
        let preferences = StylePreferences {
            preferred: vec![],
            avoided: ImageStyle::ALL.to_vec(),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let style = resolve_style(None, "x", "y", ContentKind::Email, &preferences, &mut rng);
        assert_eq!(style, ImageStyle::Photorealistic);
    }

    #[test]
    fn preferred_style_gets_more_weight() {
        let preferences = StylePreferences {
            preferred: vec![ImageStyle::Minimalist],
            avoided: vec![],
        };
        let weights =
            style_weights("spring menu", "restaurant", ContentKind::BlogPost, &preferences);
        let weight_of = |style| weights.iter().find(|(s, _)| *s == style).unwrap().1;

        assert_eq!(weight_of(ImageStyle::Minimalist), BASE_WEIGHT * PREFERRED_MULTIPLIER);
        // menu (topic) + restaurant (industry)
        assert_eq!(weight_of(ImageStyle::FlatLay), BASE_WEIGHT + 2 * AFFINITY_BOOST);
        assert_eq!(weight_of(ImageStyle::Cinematic), BASE_WEIGHT);
    }

    #[test]
    fn auto_detection_varies_across_draws() {
        let mut rng = StdRng::seed_from_u64(3);
        let drawn: HashSet<_> = (0..200)
            .map(|_| {
                resolve_style(
                    None,
                    "new patio opens",
                    "restaurant",
                    ContentKind::BusinessUpdate,
                    &StylePreferences::default(),
                    &mut rng,
                )
            })
            .collect();
        assert!(drawn.len() > 1);
    }
}
