//! Lead-capture chat agent
//!
//! Each request carries the whole conversation; nothing is stored between
//! turns except the lead, which the client echoes back as `lead_id`.
//!
//! A reply is built from rule templates keyed by the classified intent.
//! When a [`ChatModel`] is configured it writes the reply instead, with the
//! matched listings as context; any model error falls back to the template.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{CreateLeadInput, LeadIntent, LeadSource, Listing, ListingType};
use crate::services::lead::{LeadService, LeadServiceError};
use crate::services::listing::{ListingService, ListingServiceError};
use crate::services::llm::{ChatMessage, ChatModel, ChatRole};
use crate::services::search::{self, ScoredListing, SearchCriteria, SearchService};

/// Matches mentioned in a reply
const REPLY_MATCHES: usize = 3;

/// Turns forwarded to the model
const HISTORY_WINDOW: usize = 20;

/// Longest accepted message
pub const MAX_MESSAGE_CHARS: usize = 2000;

const CONTACT_ASK: &str = "If you'd like an agent to follow up, just share your name and the best email or phone number to reach you.";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid chat pattern")
}

/// What the visitor is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ScheduleShowing,
    Valuation,
    Financing,
    Rent,
    Buy,
    Contact,
    Greeting,
    Thanks,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduleShowing => "schedule_showing",
            Self::Valuation => "valuation",
            Self::Financing => "financing",
            Self::Rent => "rent",
            Self::Buy => "buy",
            Self::Contact => "contact",
            Self::Greeting => "greeting",
            Self::Thanks => "thanks",
            Self::Unknown => "unknown",
        }
    }

    /// Intents worth an agent's follow-up
    pub fn is_lead_topic(&self) -> bool {
        matches!(
            self,
            Self::ScheduleShowing | Self::Valuation | Self::Financing | Self::Rent | Self::Buy
        )
    }

    pub fn lead_intent(&self) -> Option<LeadIntent> {
        match self {
            Self::Buy | Self::ScheduleShowing | Self::Financing => Some(LeadIntent::Buy),
            Self::Rent => Some(LeadIntent::Rent),
            Self::Valuation => Some(LeadIntent::Sell),
            _ => None,
        }
    }
}

static INTENT_RULES: Lazy<Vec<(Intent, Regex)>> = Lazy::new(|| {
    vec![
        (
            Intent::ScheduleShowing,
            compile(r"\b(?:showings?|tours?|viewings?|open house|schedule a visit|see (?:it|this|that|the (?:house|home|property|place|condo|unit)) in person|come (?:see|look))\b"),
        ),
        (
            Intent::Valuation,
            compile(r"\b(?:sell|selling|sold my|valuation|apprais(?:al|e)|worth|value of my|home value|list my)\b"),
        ),
        (
            Intent::Financing,
            compile(r"\b(?:mortgage|loans?|pre-?approv(?:al|ed)|financing|finance|interest rates?|down payment|lenders?)\b"),
        ),
        (
            Intent::Rent,
            compile(r"\b(?:rent|rental|rentals|renting|lease|leasing)\b"),
        ),
        (
            Intent::Buy,
            compile(r"\b(?:buy|buying|purchase|looking for|searching for|find me|homes?|houses?|condos?|townhouses?|townhomes?|listings?|propert(?:y|ies)|bed(?:room)?s?)\b"),
        ),
        (
            Intent::Contact,
            compile(r"\b(?:call me|email me|text me|contact me|reach me|get in touch|talk to (?:an? |the )?(?:agent|realtor|broker|someone|person|human)|my (?:number|phone|email)(?: is)?)\b"),
        ),
        (
            Intent::Greeting,
            compile(r"^\W*(?:hi|hello|hey|hiya|howdy|good (?:morning|afternoon|evening))\b"),
        ),
        (
            Intent::Thanks,
            compile(r"\b(?:thanks|thank you|thx|ty|appreciate it)\b"),
        ),
    ]
});

static EMAIL: Lazy<Regex> = Lazy::new(|| compile(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"));

static PHONE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b"));

static NAME_IS: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bmy name is\s+([a-z][a-z'-]*(?:\s+[a-z][a-z'-]*)?)"));

static INTRO: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(?:I'm|I am|[Tt]his is)\s+([A-Z][a-z'-]+(?:\s+[A-Z][a-z'-]+)?)"));

/// Words that end a name captured after "my name is"
const NAME_BREAKS: &[&str] = &["and", "i", "im", "my", "from", "here", "looking", "interested", "but"];

/// Classify a single message
pub fn classify(text: &str) -> Intent {
    let lower = text.to_lowercase();
    for (intent, re) in INTENT_RULES.iter() {
        if re.is_match(&lower) {
            return *intent;
        }
    }
    // Bare criteria like "3 bed under 400k" read as shopping
    if has_shopping_criteria(&search::parse_query(&strip_contact(text))) {
        return Intent::Buy;
    }
    Intent::Unknown
}

fn has_shopping_criteria(criteria: &SearchCriteria) -> bool {
    criteria.min_bedrooms.is_some()
        || criteria.min_bathrooms.is_some()
        || criteria.min_price.is_some()
        || criteria.max_price.is_some()
        || criteria.property_type.is_some()
        || criteria.listing_type.is_some()
        || !criteria.features.is_empty()
}

/// Contact details a visitor has shared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    pub fn is_reachable(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }
}

fn title_case(words: &str) -> String {
    words
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn extract_name(text: &str) -> Option<String> {
    if let Some(caps) = NAME_IS.captures(text) {
        let words: Vec<&str> = caps[1]
            .split_whitespace()
            .take_while(|w| !NAME_BREAKS.contains(&w.to_lowercase().as_str()))
            .collect();
        if !words.is_empty() {
            return Some(title_case(&words.join(" ")));
        }
    }
    INTRO.captures(text).map(|caps| caps[1].to_string())
}

/// Scan the user turns for contact details; later mentions win
pub fn extract_contact(messages: &[ChatMessage]) -> ContactInfo {
    let mut info = ContactInfo::default();
    for message in messages.iter().filter(|m| m.role == ChatRole::User) {
        if let Some(m) = EMAIL.find(&message.content) {
            info.email = Some(m.as_str().to_lowercase());
        }
        // Emails can hold digit runs, so look for phones outside them
        let without_email = EMAIL.replace_all(&message.content, " ");
        if let Some(m) = PHONE.find(&without_email) {
            info.phone = Some(m.as_str().trim().to_string());
        }
        if let Some(name) = extract_name(&message.content) {
            info.name = Some(name);
        }
    }
    info
}

/// Remove emails and phone numbers before reading search criteria
fn strip_contact(text: &str) -> String {
    let text = EMAIL.replace_all(text, " ");
    PHONE.replace_all(&text, " ").into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ListingServiceError> for ChatError {
    fn from(e: ListingServiceError) -> Self {
        match e {
            ListingServiceError::InternalError(inner) => ChatError::InternalError(inner),
            other => ChatError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub lead_id: Option<i64>,
    #[serde(default)]
    pub listing_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Ai,
    Rules,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub intent: Intent,
    pub source: ReplySource,
    pub matches: Vec<ScoredListing>,
    pub lead_id: Option<i64>,
    pub lead_created: bool,
}

pub struct ChatAgent {
    search: Arc<SearchService>,
    listings: Arc<ListingService>,
    leads: Arc<LeadService>,
    model: Option<Arc<dyn ChatModel>>,
    site_name: String,
}

impl ChatAgent {
    pub fn new(
        search: Arc<SearchService>,
        listings: Arc<ListingService>,
        leads: Arc<LeadService>,
        model: Option<Arc<dyn ChatModel>>,
        site_name: impl Into<String>,
    ) -> Self {
        Self {
            search,
            listings,
            leads,
            model,
            site_name: site_name.into(),
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Answer the latest user turn
    pub async fn respond(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let user_turns: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect();
        let Some(latest) = user_turns.last().copied() else {
            return Err(ChatError::ValidationError("at least one user message is required".into()));
        };
        if request.messages.iter().any(|m| m.content.chars().count() > MAX_MESSAGE_CHARS) {
            return Err(ChatError::ValidationError(format!(
                "messages must be at most {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let intent = classify(latest);
        // The most recent turn with a real estate topic drives search and lead intent
        let topic = user_turns
            .iter()
            .rev()
            .map(|t| classify(t))
            .find(Intent::is_lead_topic)
            .unwrap_or(intent);

        let contact = extract_contact(&request.messages);

        let matches = if matches!(topic, Intent::Buy | Intent::Rent) {
            let conversation = strip_contact(&user_turns.join(" "));
            let mut criteria = search::parse_query(&conversation);
            let listing_type = if topic == Intent::Rent { ListingType::Rent } else { ListingType::Sale };
            criteria.listing_type.get_or_insert(listing_type);
            self.search.rank(&criteria, REPLY_MATCHES).await?
        } else {
            Vec::new()
        };

        let listing = match request.listing_id {
            Some(id) => self.listings.get_public(id).await.ok(),
            None => None,
        };

        let (lead_id, lead_created) = match request.lead_id {
            Some(id) => (Some(id), false),
            None if contact.is_reachable() => match self.capture_lead(&user_turns, &contact, topic, &listing).await {
                Some(id) => (Some(id), true),
                None => (None, false),
            },
            None => (None, false),
        };

        // Also asks again when the shared details could not be saved
        let ask_for_contact = topic.is_lead_topic() && lead_id.is_none();

        let rules_reply = self.rules_reply(intent, topic, &matches, &contact, listing.as_ref(), lead_created);
        let rules_reply = if ask_for_contact {
            format!("{} {}", rules_reply, CONTACT_ASK)
        } else {
            rules_reply
        };

        let (reply, source) = match &self.model {
            Some(model) => {
                let system = self.system_prompt(&matches, listing.as_ref(), ask_for_contact, lead_created);
                let start = request.messages.len().saturating_sub(HISTORY_WINDOW);
                match model.generate(&system, &request.messages[start..]).await {
                    Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), ReplySource::Ai),
                    Ok(_) => (rules_reply, ReplySource::Rules),
                    Err(e) => {
                        tracing::warn!("Chat model failed, using rule reply: {}", e);
                        (rules_reply, ReplySource::Rules)
                    }
                }
            }
            None => (rules_reply, ReplySource::Rules),
        };

        tracing::debug!(intent = intent.as_str(), source = ?source, matches = matches.len(), "Chat turn answered");

        Ok(ChatResponse {
            reply,
            intent,
            source,
            matches,
            lead_id,
            lead_created,
        })
    }

    async fn capture_lead(
        &self,
        user_turns: &[&str],
        contact: &ContactInfo,
        topic: Intent,
        listing: &Option<Listing>,
    ) -> Option<i64> {
        let input = CreateLeadInput {
            name: contact.name.clone().unwrap_or_default(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            message: Some(user_turns.join("\n")),
            source: Some(LeadSource::Chat.as_str().to_string()),
            listing_id: listing.as_ref().map(|l| l.id),
            intent: topic.lead_intent().map(|i| i.as_str().to_string()),
            budget: None,
            timeline: None,
        };
        match self.leads.capture(input).await {
            Ok(lead) => Some(lead.id),
            Err(LeadServiceError::ValidationError(reason)) => {
                tracing::info!("Chat contact details rejected: {}", reason);
                None
            }
            Err(e) => {
                tracing::error!("Failed to capture chat lead: {}", e);
                None
            }
        }
    }

    fn rules_reply(
        &self,
        intent: Intent,
        topic: Intent,
        matches: &[ScoredListing],
        contact: &ContactInfo,
        listing: Option<&Listing>,
        lead_created: bool,
    ) -> String {
        let greeting_name = contact
            .name
            .as_deref()
            .map(|n| format!(", {}", n))
            .unwrap_or_default();

        if lead_created {
            let reach = contact.email.as_deref().or(contact.phone.as_deref()).unwrap_or("the details you shared");
            let mut reply = format!(
                "Thanks{}! One of our agents will reach out to you at {} shortly.",
                greeting_name, reach
            );
            if !matches.is_empty() {
                reply.push(' ');
                reply.push_str(&describe_matches(matches));
            }
            return reply;
        }

        match intent {
            Intent::Buy | Intent::Rent => {
                if matches.is_empty() {
                    "I couldn't find a listing that fits yet. Could you tell me your preferred area, budget, or number of bedrooms?".to_string()
                } else {
                    describe_matches(matches)
                }
            }
            Intent::ScheduleShowing => match listing {
                Some(l) => format!(
                    "I'd be happy to set up a showing of {} at {}. What days and times work best for you?",
                    l.title,
                    l.full_address()
                ),
                None => "I'd be happy to set up a showing. Which property are you interested in, and what days and times work for you?".to_string(),
            },
            Intent::Valuation => "Thinking about selling? We offer a free, no-obligation market analysis. Tell me the property address and one of our agents will prepare a valuation for you.".to_string(),
            Intent::Financing => "We work with trusted local lenders who can help you get pre-approved. A pre-approval letter makes your offer much stronger.".to_string(),
            Intent::Contact => "Of course! Share your phone number or email and an agent will reach out shortly.".to_string(),
            Intent::Greeting => format!(
                "Hi{}! Welcome to {}. I can help you find a home, schedule a showing, or estimate what your property is worth. What are you looking for?",
                greeting_name, self.site_name
            ),
            Intent::Thanks => "You're welcome! Is there anything else I can help you with?".to_string(),
            Intent::Unknown if topic.is_lead_topic() && !matches.is_empty() => describe_matches(matches),
            Intent::Unknown => "I can help you search listings, schedule showings, or connect you with an agent. Could you tell me a bit more about what you're looking for?".to_string(),
        }
    }

    fn system_prompt(
        &self,
        matches: &[ScoredListing],
        listing: Option<&Listing>,
        ask_for_contact: bool,
        lead_created: bool,
    ) -> String {
        let mut prompt = format!(
            "You are the friendly assistant for {}, a real estate brokerage. \
             Answer in two to four short sentences. Only mention properties listed below; \
             never invent listings, prices or addresses.",
            self.site_name
        );

        if let Some(l) = listing {
            prompt.push_str(&format!(
                "\n\nThe visitor is viewing: {}",
                listing_line(l)
            ));
        }
        if matches.is_empty() {
            prompt.push_str("\n\nNo listings currently match the visitor's request.");
        } else {
            prompt.push_str("\n\nMatching listings:");
            for m in matches {
                prompt.push_str(&format!("\n- {}", listing_line(&m.listing)));
            }
        }
        if ask_for_contact {
            prompt.push_str("\n\nThe visitor has not shared contact details yet. Invite them to share a name and an email or phone number so an agent can follow up.");
        }
        if lead_created {
            prompt.push_str("\n\nThe visitor just shared contact details. Thank them and say an agent will reach out soon.");
        }
        prompt
    }
}

fn listing_line(l: &Listing) -> String {
    let mut line = format!("{} in {}: {}", l.title, l.city, search::format_price(l.price));
    if let Some(bedrooms) = l.bedrooms {
        line.push_str(&format!(", {} bd", bedrooms));
    }
    if let Some(bathrooms) = l.bathrooms {
        line.push_str(&format!(", {} ba", bathrooms));
    }
    line
}

fn describe_matches(matches: &[ScoredListing]) -> String {
    let names: Vec<String> = matches.iter().map(|m| listing_line(&m.listing)).collect();
    format!(
        "Here {} {}: {}.",
        if matches.len() == 1 { "is" } else { "are" },
        if matches.len() == 1 { "a home that fits" } else { "some homes that fit" },
        names.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxListingRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{CreateListingInput, LeadFilter, Pagination};
    use crate::services::email::tests::RecordingMailer;
    use crate::services::lead::tests::build_service;
    use crate::services::llm::LlmError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedModel(&'static str);

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn generate(&self, system: &str, history: &[ChatMessage]) -> Result<String, LlmError> {
            assert!(system.contains("Test Realty"));
            assert!(!history.is_empty());
            Ok(self.0.to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn generate(&self, _system: &str, _history: &[ChatMessage]) -> Result<String, LlmError> {
            Err(LlmError::Status {
                status: 503,
                body: "overloaded".into(),
            })
        }
    }

    struct Harness {
        agent: ChatAgent,
        leads: Arc<LeadService>,
        mailer: Arc<RecordingMailer>,
        pool: DynDatabasePool,
    }

    async fn harness(model: Option<Arc<dyn ChatModel>>) -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let cache = Arc::new(MemoryCache::new(100, Duration::from_secs(60)));
        let listings = Arc::new(ListingService::new(SqlxListingRepository::boxed(pool.clone()), cache));
        for (title, city, price, bedrooms, listing_type) in [
            ("Downtown condo", "Austin", 420_000, 2, "sale"),
            ("Family house", "Austin", 560_000, 4, "sale"),
            ("Loft rental", "Austin", 2_400, 1, "rent"),
        ] {
            listings
                .create(CreateListingInput {
                    title: title.into(),
                    address: "1 Main St".into(),
                    city: city.into(),
                    price,
                    bedrooms: Some(bedrooms),
                    listing_type: Some(listing_type.into()),
                    property_type: Some(if title.contains("house") { "house" } else { "condo" }.into()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let mailer = Arc::new(RecordingMailer::default());
        let leads = Arc::new(build_service(pool.clone(), mailer.clone()));
        let search = Arc::new(SearchService::new(listings.clone(), 6));
        let agent = ChatAgent::new(search, listings, leads.clone(), model, "Test Realty");
        Harness { agent, leads, mailer, pool }
    }

    fn request(turns: &[&str]) -> ChatRequest {
        ChatRequest {
            messages: turns
                .iter()
                .enumerate()
                .map(|(i, t)| if i % 2 == 0 { ChatMessage::user(*t) } else { ChatMessage::assistant(*t) })
                .collect(),
            lead_id: None,
            listing_id: None,
        }
    }

    #[test]
    fn test_classify_table() {
        let cases = [
            ("Can I schedule a showing this weekend?", Intent::ScheduleShowing),
            ("I'd love to tour the place", Intent::ScheduleShowing),
            ("What is my house worth?", Intent::Valuation),
            ("We're thinking of selling", Intent::Valuation),
            ("Do you help with mortgage pre-approval?", Intent::Financing),
            ("Any apartments to rent downtown?", Intent::Rent),
            ("Looking for a 3 bedroom house", Intent::Buy),
            ("3 bed under 400k", Intent::Buy),
            ("Please call me tomorrow", Intent::Contact),
            ("Hello!", Intent::Greeting),
            ("thank you so much", Intent::Thanks),
            ("what's the weather like", Intent::Unknown),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text), expected, "classifying {:?}", text);
        }
    }

    #[test]
    fn test_extract_contact() {
        let messages = vec![
            ChatMessage::user("Hi, my name is jamie lee and I want a condo"),
            ChatMessage::assistant("Great! How can we reach you? My email is bot@example.com"),
            ChatMessage::user("Reach me at Jamie.Lee@Example.com or (512) 555-0142"),
        ];
        let info = extract_contact(&messages);
        assert_eq!(info.name.as_deref(), Some("Jamie Lee"));
        assert_eq!(info.email.as_deref(), Some("jamie.lee@example.com"));
        assert_eq!(info.phone.as_deref(), Some("(512) 555-0142"));

        let intro = extract_contact(&[ChatMessage::user("This is Priya, 512.555.0100")]);
        assert_eq!(intro.name.as_deref(), Some("Priya"));
        assert_eq!(intro.phone.as_deref(), Some("512.555.0100"));
        assert!(intro.email.is_none());

        let none = extract_contact(&[ChatMessage::user("I'm looking for a house")]);
        assert_eq!(none, ContactInfo::default());
    }

    #[tokio::test]
    async fn test_buy_intent_searches_and_asks_for_contact() {
        let h = harness(None).await;
        let response = h
            .agent
            .respond(request(&["Looking for a condo in Austin under $450k"]))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::Buy);
        assert_eq!(response.source, ReplySource::Rules);
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].listing.title, "Downtown condo");
        assert!(response.reply.contains("Downtown condo"));
        assert!(response.reply.contains(CONTACT_ASK));
        assert!(response.lead_id.is_none());
    }

    #[tokio::test]
    async fn test_contact_ask_follows_intent() {
        let h = harness(None).await;
        let cases = [
            ("Looking for a condo in Austin", Intent::Buy, true),
            ("Anything for rent in Austin?", Intent::Rent, true),
            ("We're thinking of selling our place", Intent::Valuation, true),
            ("Can I schedule a showing this weekend?", Intent::ScheduleShowing, true),
            ("Do you help with mortgage pre-approval?", Intent::Financing, true),
            ("Hello!", Intent::Greeting, false),
            ("thank you so much", Intent::Thanks, false),
            ("what's the weather like", Intent::Unknown, false),
        ];
        for (text, intent, asks) in cases {
            let response = h.agent.respond(request(&[text])).await.unwrap();
            assert_eq!(response.intent, intent, "classifying {:?}", text);
            assert_eq!(response.reply.contains(CONTACT_ASK), asks, "reply to {:?}", text);
            assert!(response.lead_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_failed_capture_asks_for_contact_again() {
        let h = harness(None).await;
        h.pool.execute("DROP TABLE leads").await.unwrap();

        let response = h
            .agent
            .respond(request(&["I want to sell my house, email me at pat@example.com"]))
            .await
            .unwrap();

        assert!(!response.lead_created);
        assert!(response.lead_id.is_none());
        assert!(response.reply.contains(CONTACT_ASK));
    }

    #[tokio::test]
    async fn test_rent_intent_only_matches_rentals() {
        let h = harness(None).await;
        let response = h.agent.respond(request(&["Anything for rent in Austin?"])).await.unwrap();
        assert_eq!(response.intent, Intent::Rent);
        assert!(response.matches.iter().all(|m| m.listing.title == "Loft rental"));
        assert!(!response.matches.is_empty());
    }

    #[tokio::test]
    async fn test_lead_created_once() {
        let h = harness(None).await;
        let first = h
            .agent
            .respond(request(&[
                "I want to buy a house in Austin",
                "Happy to help! How can an agent reach you?",
                "My name is Sam, sam@example.com",
            ]))
            .await
            .unwrap();

        assert!(first.lead_created);
        let lead_id = first.lead_id.unwrap();
        assert!(first.reply.contains("sam@example.com"));
        assert!(!first.reply.contains(CONTACT_ASK));

        let detail = h.leads.get(lead_id).await.unwrap();
        assert_eq!(detail.lead.name, "Sam");
        assert_eq!(detail.lead.source, LeadSource::Chat);
        assert_eq!(detail.lead.intent, Some(LeadIntent::Buy));
        assert_eq!(
            detail.lead.message.as_deref(),
            Some("I want to buy a house in Austin\nMy name is Sam, sam@example.com")
        );
        assert!(!h.mailer.sent.lock().await.is_empty());

        let mut follow_up = request(&[
            "I want to buy a house in Austin",
            "Thanks Sam!",
            "My name is Sam, sam@example.com",
            "An agent will reach out.",
            "thanks",
        ]);
        follow_up.lead_id = Some(lead_id);
        let second = h.agent.respond(follow_up).await.unwrap();
        assert!(!second.lead_created);
        assert_eq!(second.lead_id, Some(lead_id));

        let (_, total) = h.leads.list(&LeadFilter::default(), Pagination::default()).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_unnamed_visitor_gets_default_name() {
        let h = harness(None).await;
        let response = h
            .agent
            .respond(request(&["What's my home worth? text 512-555-0188"]))
            .await
            .unwrap();
        let detail = h.leads.get(response.lead_id.unwrap()).await.unwrap();
        assert_eq!(detail.lead.name, "Chat visitor");
        assert_eq!(detail.lead.intent, Some(LeadIntent::Sell));
    }

    #[tokio::test]
    async fn test_model_reply_is_used() {
        let h = harness(Some(Arc::new(FixedModel("We have a lovely condo downtown.")))).await;
        let response = h.agent.respond(request(&["hi there"])).await.unwrap();
        assert_eq!(response.source, ReplySource::Ai);
        assert_eq!(response.reply, "We have a lovely condo downtown.");
        assert_eq!(response.intent, Intent::Greeting);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_rules() {
        let h = harness(Some(Arc::new(FailingModel))).await;
        let response = h.agent.respond(request(&["hello"])).await.unwrap();
        assert_eq!(response.source, ReplySource::Rules);
        assert!(response.reply.starts_with("Hi! Welcome to Test Realty."));
    }

    #[tokio::test]
    async fn test_requires_user_message() {
        let h = harness(None).await;
        let empty = ChatRequest {
            messages: vec![ChatMessage::assistant("How can I help?")],
            lead_id: None,
            listing_id: None,
        };
        assert!(matches!(h.agent.respond(empty).await, Err(ChatError::ValidationError(_))));

        let long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            h.agent.respond(request(&[long.as_str()])).await,
            Err(ChatError::ValidationError(_))
        ));
    }
}
