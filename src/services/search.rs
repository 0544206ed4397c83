//! Property search
//!
//! Free-text queries ("3 bed condo in Austin under $500k") are parsed into
//! [`SearchCriteria`] and matched against visible listings with an additive
//! score. Hard mismatches (sold, wrong type, far over budget) exclude a
//! listing; everything else adds or subtracts points and leaves a reason.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Listing, ListingStatus, ListingType, PropertyType};
use crate::services::listing::{ListingService, ListingServiceError};

/// Largest result page a caller may request
pub const MAX_LIMIT: usize = 50;

/// Listings priced up to this factor over the max still count as near misses
const PRICE_TOLERANCE: f64 = 1.10;

const AMOUNT: &str = r"\$?\s*\d[\d,]*(?:\.\d+)?\s*(?:k|mm|m|mil|million|thousand)?\b";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid search pattern")
}

static BEDROOMS: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(\d+|one|two|three|four|five|six)\s*\+?[\s-]*(?:bed(?:room)?s?|bdrms?|br|bd)\b")
});

static BATHROOMS: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(\d+(?:\.\d)?|one|two|three|four)\s*\+?[\s-]*(?:bath(?:room)?s?|ba)\b")
});

static BETWEEN: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"\bbetween\s+({AMOUNT})\s+and\s+({AMOUNT})")));

static RANGE: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"({AMOUNT})\s*(?:-|–|to)\s*({AMOUNT})")));

static MAX_PRICE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"\b(?:under|below|less than|max(?:imum)?|up to|at most|no more than|budget(?: of| is)?|within)\s*:?\s*({AMOUNT})"
    ))
});

static MIN_PRICE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"\b(?:over|above|more than|at least|min(?:imum)?|from|starting at|north of)\s*:?\s*({AMOUNT})"
    ))
});

static BARE_PRICE: Lazy<Regex> = Lazy::new(|| compile(&format!("({AMOUNT})")));

static PRICE_NUMBER: Lazy<Regex> =
    Lazy::new(|| compile(r"(\d+(?:\.\d+)?)\s*(k|mm|m|mil|million|thousand)?\b"));

static PROPERTY_TYPES: Lazy<Vec<(Regex, PropertyType)>> = Lazy::new(|| {
    vec![
        (
            compile(r"\b(?:town\s?houses?|town\s?homes?|row\s?houses?)\b"),
            PropertyType::Townhouse,
        ),
        (
            compile(r"\b(?:multi[\s-]?family(?: homes?)?|duplex(?:es)?|triplex(?:es)?|fourplex(?:es)?|quadplex(?:es)?)\b"),
            PropertyType::MultiFamily,
        ),
        (
            compile(r"\b(?:condos?|condominiums?|apartments?|apt|flats?|lofts?)\b"),
            PropertyType::Condo,
        ),
        (
            compile(r"\b(?:land|acreage|acres?|vacant lots?|building lots?)\b"),
            PropertyType::Land,
        ),
        (
            compile(r"\b(?:commercial|office space|retail space|warehouses?)\b"),
            PropertyType::Commercial,
        ),
        (
            compile(r"\b(?:houses?|single[\s-]?family(?: homes?)?|bungalows?|cottages?|ranch(?:es)?)\b"),
            PropertyType::House,
        ),
    ]
});

static LISTING_TYPES: Lazy<Vec<(Regex, ListingType)>> = Lazy::new(|| {
    vec![
        (
            compile(r"\b(?:for rent|to rent|rent|rentals?|renting|for lease|lease|leasing)\b"),
            ListingType::Rent,
        ),
        (
            compile(r"\b(?:for sale|buy|buying|purchase|purchasing|to own)\b"),
            ListingType::Sale,
        ),
    ]
});

/// Canonical feature name and the phrases that mean it
const FEATURE_SYNONYMS: &[(&str, &[&str])] = &[
    ("pool", &["pool", "pools", "swimming pool"]),
    ("garage", &["garage", "garages"]),
    ("waterfront", &["waterfront", "lakefront", "oceanfront", "beachfront", "riverfront", "on the water"]),
    ("view", &["view", "views"]),
    ("fireplace", &["fireplace", "fireplaces"]),
    ("yard", &["yard", "backyard", "back yard", "yards"]),
    ("basement", &["basement"]),
    ("renovated", &["renovated", "updated", "remodeled", "remodelled"]),
    ("hardwood", &["hardwood", "hardwoods", "hardwood floors"]),
    ("patio", &["patio"]),
    ("balcony", &["balcony", "balconies"]),
    ("garden", &["garden", "gardens"]),
];

static FEATURES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FEATURE_SYNONYMS
        .iter()
        .map(|(name, phrases)| {
            let alternatives: Vec<String> = phrases.iter().map(|p| regex::escape(p)).collect();
            (*name, compile(&format!(r"\b(?:{})\b", alternatives.join("|"))))
        })
        .collect()
});

static TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| compile(r"[^a-z0-9]+"));

const STOPWORDS: &[&str] = &[
    "about", "also", "and", "any", "apartment", "are", "area", "around", "bath", "baths",
    "bathroom", "bathrooms", "bed", "beds", "bedroom", "bedrooms", "big", "budget", "but",
    "call", "can", "close", "contact", "could", "dollars", "email", "family", "feet", "find",
    "for", "from", "get", "good", "great", "has", "have", "having", "hello", "hey", "home",
    "homes", "interested", "into", "just", "large", "least", "less", "like", "listing",
    "listings", "looking", "love", "max", "maybe", "min", "more", "most", "name", "near",
    "nearby", "need", "new", "nice", "not", "one", "only", "our", "out", "phone", "place",
    "places", "please", "price", "priced", "properties", "property", "really", "room",
    "rooms", "sale", "search", "searching", "see", "show", "single", "small", "some",
    "something", "somewhere", "sqft", "square", "than", "thanks", "that", "the", "there",
    "these", "thing", "this", "those", "too", "under", "over", "very", "want", "what",
    "where", "which", "with", "within", "would", "you", "your",
];

/// What a visitor is looking for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub min_bedrooms: Option<i32>,
    pub min_bathrooms: Option<f64>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub features: Vec<String>,
    /// Lowercased city, street or zip terms
    pub locations: Vec<String>,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.min_bedrooms.is_none()
            && self.min_bathrooms.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.property_type.is_none()
            && self.listing_type.is_none()
            && self.features.is_empty()
            && self.locations.is_empty()
    }
}

/// A listing with its match score and the reasons behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredListing {
    pub listing: Listing,
    pub score: i32,
    pub reasons: Vec<String>,
}

/// Cut the first match of `re` out of `text`, returning its capture groups
fn take(re: &Regex, text: &mut String) -> Option<Vec<Option<String>>> {
    let (range, groups) = {
        let caps = re.captures(text)?;
        let whole = caps.get(0)?;
        let groups = caps
            .iter()
            .skip(1)
            .map(|g| g.map(|m| m.as_str().trim().to_string()))
            .collect::<Vec<_>>();
        (whole.range(), groups)
    };
    text.replace_range(range, " ");
    Some(groups)
}

fn word_number(word: &str) -> Option<f64> {
    match word {
        "one" => Some(1.0),
        "two" => Some(2.0),
        "three" => Some(3.0),
        "four" => Some(4.0),
        "five" => Some(5.0),
        "six" => Some(6.0),
        other => other.parse().ok(),
    }
}

fn multiplier(suffix: &str) -> f64 {
    match suffix {
        "k" | "thousand" => 1_000.0,
        "m" | "mm" | "mil" | "million" => 1_000_000.0,
        _ => 1.0,
    }
}

/// A matched money amount before it is turned into dollars
#[derive(Debug, Clone, Copy)]
struct Amount {
    value: f64,
    multiplier: Option<f64>,
    dollar_sign: bool,
}

impl Amount {
    fn parse(raw: &str) -> Option<Self> {
        let dollar_sign = raw.contains('$');
        let cleaned = raw.replace(['$', ','], "");
        let caps = PRICE_NUMBER.captures(&cleaned)?;
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let multiplier = caps.get(2).map(|m| multiplier(m.as_str()));
        Some(Self {
            value,
            multiplier,
            dollar_sign,
        })
    }

    /// Whether this reads as money rather than some other count
    fn is_price(&self) -> bool {
        self.dollar_sign || self.multiplier.is_some() || self.value >= 1_000.0
    }

    fn dollars(&self) -> i64 {
        (self.value * self.multiplier.unwrap_or(1.0)).round() as i64
    }
}

/// Parse a price phrase into whole dollars.
///
/// Accepts `"$1,250,000"`, `"450k"`, `"1.2m"` and `"2 million"`; returns
/// `None` when the text holds no number.
pub fn parse_price(text: &str) -> Option<i64> {
    Amount::parse(&text.to_lowercase()).map(|a| a.dollars())
}

fn range_bounds(low: &str, high: &str) -> Option<(i64, i64)> {
    let mut low = Amount::parse(low)?;
    let high = Amount::parse(high)?;
    if !low.is_price() && !high.is_price() {
        return None;
    }
    // "$400-600k": the suffix on the upper bound applies to both
    if low.multiplier.is_none() && high.multiplier.is_some() {
        low.multiplier = high.multiplier;
    }
    let (a, b) = (low.dollars(), high.dollars());
    Some((a.min(b), a.max(b)))
}

fn price_capture(groups: &[Option<String>]) -> Option<i64> {
    let amount = Amount::parse(groups.first()?.as_deref()?)?;
    amount.is_price().then(|| amount.dollars())
}

/// Extract search criteria from free text
pub fn parse_query(text: &str) -> SearchCriteria {
    let mut work = text.to_lowercase();
    let mut criteria = SearchCriteria::default();

    if let Some(groups) = take(&BEDROOMS, &mut work) {
        criteria.min_bedrooms = groups[0].as_deref().and_then(word_number).map(|n| n as i32);
    }
    if let Some(groups) = take(&BATHROOMS, &mut work) {
        criteria.min_bathrooms = groups[0].as_deref().and_then(word_number);
    }

    let range = take(&BETWEEN, &mut work).or_else(|| take(&RANGE, &mut work));
    if let Some((low, high)) = range.and_then(|g| range_bounds(g[0].as_deref()?, g[1].as_deref()?)) {
        criteria.min_price = Some(low);
        criteria.max_price = Some(high);
    }
    if criteria.max_price.is_none() {
        criteria.max_price = take(&MAX_PRICE, &mut work).and_then(|g| price_capture(&g));
    }
    if criteria.min_price.is_none() {
        criteria.min_price = take(&MIN_PRICE, &mut work).and_then(|g| price_capture(&g));
    }
    if criteria.min_price.is_none() && criteria.max_price.is_none() {
        // A lone "$450k" or "600k" reads as a budget; plain counts are skipped
        let budget = BARE_PRICE.captures_iter(&work).find_map(|caps| {
            let m = caps.get(1)?;
            Amount::parse(m.as_str())
                .filter(|a| a.dollar_sign || a.multiplier.is_some())
                .map(|a| (a, m.range()))
        });
        if let Some((amount, range)) = budget {
            criteria.max_price = Some(amount.dollars());
            work.replace_range(range, " ");
        }
    }

    for (re, property_type) in PROPERTY_TYPES.iter() {
        if re.is_match(&work) {
            criteria.property_type.get_or_insert(*property_type);
            work = re.replace_all(&work, " ").into_owned();
        }
    }
    for (re, listing_type) in LISTING_TYPES.iter() {
        if re.is_match(&work) {
            criteria.listing_type.get_or_insert(*listing_type);
            work = re.replace_all(&work, " ").into_owned();
        }
    }
    for (name, re) in FEATURES.iter() {
        if re.is_match(&work) {
            criteria.features.push((*name).to_string());
            work = re.replace_all(&work, " ").into_owned();
        }
    }

    for token in TOKEN_SPLIT.split(&work) {
        let is_zip = token.len() == 5 && token.chars().all(|c| c.is_ascii_digit());
        let is_word = token.len() >= 3
            && !token.chars().all(|c| c.is_ascii_digit())
            && !STOPWORDS.contains(&token);
        if (is_zip || is_word) && !criteria.locations.iter().any(|l| l == token) {
            criteria.locations.push(token.to_string());
        }
    }

    criteria
}

fn feature_matches(feature: &str, haystack: &str) -> bool {
    FEATURES
        .iter()
        .find(|(name, _)| *name == feature)
        .map(|(_, re)| re.is_match(haystack))
        .unwrap_or_else(|| haystack.contains(feature))
}

/// Score one listing; `None` means the listing is excluded outright
pub fn score(listing: &Listing, criteria: &SearchCriteria) -> Option<ScoredListing> {
    if !listing.is_visible() {
        return None;
    }
    if criteria.listing_type.is_some_and(|t| t != listing.listing_type) {
        return None;
    }
    if criteria.property_type.is_some_and(|t| t != listing.property_type) {
        return None;
    }
    if let Some(max) = criteria.max_price {
        if listing.price as f64 > max as f64 * PRICE_TOLERANCE {
            return None;
        }
    }

    let mut points = 0;
    let mut reasons = Vec::new();

    if let Some(property_type) = criteria.property_type {
        points += 30;
        reasons.push(format!("Is a {}", property_type.label()));
    }

    let city = listing.city.to_lowercase();
    let address = listing.address.to_lowercase();
    let text = format!("{} {}", listing.title, listing.description).to_lowercase();
    for term in &criteria.locations {
        if city.contains(term.as_str()) {
            points += 25;
            reasons.push(format!("In {}", listing.city));
        } else if listing.zip_code == *term || address.contains(term.as_str()) {
            points += 15;
            reasons.push(format!("Near {}", term));
        } else if text.contains(term.as_str()) {
            points += 5;
            reasons.push(format!("Mentions {}", term));
        }
    }

    if let (Some(wanted), Some(bedrooms)) = (criteria.min_bedrooms, listing.bedrooms) {
        if bedrooms >= wanted {
            points += 20;
            if bedrooms == wanted {
                points += 5;
            }
            reasons.push(format!("{} bedrooms", bedrooms));
        } else {
            points -= 15;
        }
    }

    if let (Some(wanted), Some(bathrooms)) = (criteria.min_bathrooms, listing.bathrooms) {
        if bathrooms >= wanted {
            points += 10;
            reasons.push(format!("{} bathrooms", bathrooms));
        } else {
            points -= 10;
        }
    }

    if criteria.min_price.is_some() || criteria.max_price.is_some() {
        let above_min = criteria.min_price.map_or(true, |min| listing.price >= min);
        let below_max = criteria.max_price.map_or(true, |max| listing.price <= max);
        if above_min && below_max {
            points += 25;
            reasons.push(format!("Priced at {}", format_price(listing.price)));
        } else if !below_max {
            points += 5;
            reasons.push("Slightly over budget".to_string());
        } else {
            points -= 10;
        }
    }

    if !criteria.features.is_empty() {
        let haystack = format!("{} {}", listing.features.join(" "), text).to_lowercase();
        for feature in &criteria.features {
            if feature_matches(feature, &haystack) {
                points += 8;
                reasons.push(format!("Has {}", feature));
            }
        }
    }

    if listing.featured {
        points += 3;
    }
    if listing.status == ListingStatus::Active {
        points += 5;
    }

    Some(ScoredListing {
        listing: listing.clone(),
        score: points,
        reasons,
    })
}

/// Rank `listings` against `criteria`.
///
/// Empty criteria keep the incoming order of visible listings. Otherwise only
/// positive scores are kept, ordered by score, then price, then id.
pub fn search(listings: &[Listing], criteria: &SearchCriteria, limit: usize) -> Vec<ScoredListing> {
    if criteria.is_empty() {
        return listings
            .iter()
            .filter_map(|l| score(l, criteria))
            .take(limit)
            .collect();
    }

    let mut results: Vec<ScoredListing> = listings
        .iter()
        .filter_map(|l| score(l, criteria))
        .filter(|s| s.score > 0)
        .collect();

    results.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.listing.price.cmp(&b.listing.price))
            .then(a.listing.id.cmp(&b.listing.id))
    });
    results.truncate(limit);
    results
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

/// Short display price: `$1.25M`, `$450K`, `$2,450`
pub fn format_price(price: i64) -> String {
    if price.abs() >= 1_000_000 {
        let millions = format!("{:.2}", price as f64 / 1_000_000.0);
        let millions = millions.trim_end_matches('0').trim_end_matches('.');
        format!("${}M", millions)
    } else if price.abs() >= 1_000 && price % 1_000 == 0 {
        format!("${}K", price / 1_000)
    } else {
        format!("${}", group_thousands(price))
    }
}

fn plural_noun(property_type: Option<PropertyType>) -> &'static str {
    match property_type {
        Some(PropertyType::House) => "houses",
        Some(PropertyType::Condo) => "condos",
        Some(PropertyType::Townhouse) => "townhouses",
        Some(PropertyType::MultiFamily) => "multi-family homes",
        Some(PropertyType::Land) => "land parcels",
        Some(PropertyType::Commercial) => "commercial properties",
        None => "homes",
    }
}

fn join_words(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "3+ bedroom condos for rent in Austin under $500K with pool"
pub fn describe(criteria: &SearchCriteria) -> String {
    let mut out = String::new();
    if let Some(bedrooms) = criteria.min_bedrooms {
        out.push_str(&format!("{}+ bedroom ", bedrooms));
    }
    out.push_str(plural_noun(criteria.property_type));
    match criteria.listing_type {
        Some(ListingType::Rent) => out.push_str(" for rent"),
        Some(ListingType::Sale) => out.push_str(" for sale"),
        None => {}
    }
    if !criteria.locations.is_empty() {
        let places: Vec<String> = criteria.locations.iter().map(|l| capitalize(l)).collect();
        out.push_str(&format!(" in {}", places.join(" ")));
    }
    match (criteria.min_price, criteria.max_price) {
        (Some(min), Some(max)) => {
            out.push_str(&format!(" between {} and {}", format_price(min), format_price(max)))
        }
        (None, Some(max)) => out.push_str(&format!(" under {}", format_price(max))),
        (Some(min), None) => out.push_str(&format!(" over {}", format_price(min))),
        (None, None) => {}
    }
    if !criteria.features.is_empty() {
        out.push_str(&format!(" with {}", join_words(&criteria.features)));
    }
    out
}

/// One sentence describing what a search found
pub fn summarize(criteria: &SearchCriteria, results: &[ScoredListing]) -> String {
    if criteria.is_empty() {
        return if results.is_empty() {
            "There are no listings available right now.".to_string()
        } else {
            format!("Here are {} of our current listings.", results.len())
        };
    }

    let description = describe(criteria);
    match results.first() {
        None => format!(
            "I couldn't find any {} right now. Try widening your budget or search area.",
            description
        ),
        Some(best) => format!(
            "I found {} {} for {}. The best match is {} at {}.",
            results.len(),
            if results.len() == 1 { "match" } else { "matches" },
            description,
            best.listing.title,
            format_price(best.listing.price)
        ),
    }
}

/// Search response body
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub criteria: SearchCriteria,
    pub summary: String,
    pub results: Vec<ScoredListing>,
}

/// Runs searches over the live public inventory
pub struct SearchService {
    listings: Arc<ListingService>,
    default_limit: usize,
}

impl SearchService {
    pub fn new(listings: Arc<ListingService>, default_limit: usize) -> Self {
        Self {
            listings,
            default_limit: default_limit.clamp(1, MAX_LIMIT),
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Parse `query` and rank the visible listings against it
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<SearchOutcome, ListingServiceError> {
        let criteria = parse_query(query);
        let limit = limit.unwrap_or(self.default_limit).clamp(1, MAX_LIMIT);
        let results = self.rank(&criteria, limit).await?;
        let summary = summarize(&criteria, &results);

        tracing::debug!(query = %query, matches = results.len(), "Search completed");

        Ok(SearchOutcome {
            query: query.to_string(),
            criteria,
            summary,
            results,
        })
    }

    /// Rank visible listings against already parsed criteria
    pub async fn rank(
        &self,
        criteria: &SearchCriteria,
        limit: usize,
    ) -> Result<Vec<ScoredListing>, ListingServiceError> {
        let inventory = self.listings.visible_inventory().await?;
        Ok(search(&inventory, criteria, limit))
    }
}
