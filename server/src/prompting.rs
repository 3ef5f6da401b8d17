use minijinja::{context, Environment, Value};

use crate::types::{Provider, ISSUE_CATEGORIES};

const PARSE_ISSUE_TEMPLATE: &str = include_str!("prompts/parse_issue.j2");
const EXTRACT_INTENT_TEMPLATE: &str = include_str!("prompts/extract_intent.j2");
const WHATSAPP_CONTEXT_TEMPLATE: &str = include_str!("prompts/whatsapp_context.j2");
const VOICE_CONTEXT_TEMPLATE: &str = include_str!("prompts/voice_context.j2");
const PROVIDER_EMAIL_TEMPLATE: &str = include_str!("prompts/provider_request_email.j2");
const SUPPORT_EMAIL_TEMPLATE: &str = include_str!("prompts/support_request_email.j2");

pub const ASSISTANT_INSTRUCTIONS: &str =
    "You are a helpful auto-repair assistant. Answer the user's car problem questions.";

/// Renders a single template, `None` when it fails to parse or render.
/// Names ending in `.html` get HTML auto-escaping.
fn render(name: &str, source: &str, ctx: Value) -> Option<String> {
    let mut env = Environment::new();
    if let Err(err) = env.add_template(name, source) {
        tracing::warn!(template = name, error = %err, "template failed to parse");
        return None;
    }
    let template = env.get_template(name).ok()?;
    match template.render(ctx) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(template = name, error = %err, "template failed to render");
            None
        }
    }
}

pub fn parse_issue_instructions() -> String {
    render(
        "parse_issue",
        PARSE_ISSUE_TEMPLATE,
        context! { categories => ISSUE_CATEGORIES },
    )
    .unwrap_or_else(|| {
        format!(
            "You are a car repair intake assistant. Return only a JSON object with carModel \
             (or 'Unknown'), issueCategory (one of {}, or 'Other') and issueDescription \
             (a 1-2 sentence summary).",
            ISSUE_CATEGORIES.join(", ")
        )
    })
}

pub fn extract_intent_instructions() -> String {
    render("extract_intent", EXTRACT_INTENT_TEMPLATE, context! {}).unwrap_or_else(|| {
        "Translate the customer's message to English. Return only a JSON object with \
         englishMessage and detectedLanguage."
            .to_string()
    })
}

/// What the customer said and what the intake agents made of it.
pub struct CustomerContext<'a> {
    pub customer_name: &'a str,
    pub language: &'a str,
    pub original_message: &'a str,
    pub english_message: &'a str,
    pub issue_category: &'a str,
    pub car_model: &'a str,
    pub issue_summary: &'a str,
    pub providers: &'a [&'a Provider],
}

fn rating_label(provider: &Provider, missing: &str) -> String {
    match provider.rating {
        Some(rating) if rating != 0.0 => rating.to_string(),
        _ => missing.to_string(),
    }
}

pub fn render_whatsapp_context(ctx: &CustomerContext<'_>) -> String {
    render(
        "whatsapp_context",
        WHATSAPP_CONTEXT_TEMPLATE,
        context! {
            customer_name => ctx.customer_name,
            language => ctx.language,
            original_message => ctx.original_message,
            english_message => ctx.english_message,
            issue_category => ctx.issue_category,
            car_model => ctx.car_model,
            issue_summary => ctx.issue_summary,
            providers => ctx.providers,
        },
    )
    .unwrap_or_else(|| fallback_whatsapp_context(ctx))
}

fn fallback_whatsapp_context(ctx: &CustomerContext<'_>) -> String {
    let providers = if ctx.providers.is_empty() {
        "No specific providers found for this category in the database.".to_string()
    } else {
        ctx.providers
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "{}. {} | Phone: {} | Email: {} | Address: {} | Rating: {}",
                    i + 1,
                    p.name,
                    p.phone,
                    p.email,
                    p.address,
                    rating_label(p, "N/A")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Customer Name: {}\nCustomer's Original Language: {}\nCustomer's Original Message: {}\n\
         Translated/Clarified Message (English): {}\nDetected Issue Category: {}\n\
         Car Model: {}\nIssue Summary: {}\n\nAvailable Nearby Providers for this Issue:\n{}\n\n\
         IMPORTANT: Respond to the customer in {} (their original language). Keep it under 300 \
         words and mention the providers when there are any.",
        ctx.customer_name,
        ctx.language,
        ctx.original_message,
        ctx.english_message,
        ctx.issue_category,
        ctx.car_model,
        ctx.issue_summary,
        providers,
        ctx.language
    )
}

pub fn render_voice_context(ctx: &CustomerContext<'_>) -> String {
    render(
        "voice_context",
        VOICE_CONTEXT_TEMPLATE,
        context! {
            language => ctx.language,
            original_message => ctx.original_message,
            english_message => ctx.english_message,
            issue_category => ctx.issue_category,
            car_model => ctx.car_model,
            issue_summary => ctx.issue_summary,
            providers => ctx.providers,
        },
    )
    .unwrap_or_else(|| fallback_voice_context(ctx))
}

fn fallback_voice_context(ctx: &CustomerContext<'_>) -> String {
    let providers = ctx
        .providers
        .iter()
        .map(|p| format!("{} ({}, rating {})", p.name, p.phone, rating_label(p, "New")))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "You are a helpful auto-repair voice assistant. The customer said: {}\n\
         In English: {}\nCategory: {}. Car: {}. Providers: {}\n\
         Reply only in {}, under 120 words, without markdown.",
        ctx.original_message,
        ctx.english_message,
        ctx.issue_category,
        ctx.car_model,
        if providers.is_empty() { "none" } else { &providers },
        ctx.language
    )
}

pub struct ProviderEmail<'a> {
    pub provider_name: &'a str,
    pub lead_id: &'a str,
    pub car_model: &'a str,
    pub issue_category: &'a str,
    pub issue_description: &'a str,
    pub distance_km: f64,
}

pub fn render_provider_email(email: &ProviderEmail<'_>) -> String {
    let distance = format!("{:.1}", email.distance_km);
    render(
        "provider_request_email.html",
        PROVIDER_EMAIL_TEMPLATE,
        context! {
            provider_name => email.provider_name,
            lead_id => email.lead_id,
            car_model => email.car_model,
            issue_category => email.issue_category,
            issue_description => email.issue_description,
            distance => distance,
        },
    )
    .unwrap_or_else(|| {
        format!(
            "<p>New {} request ({}) {distance} km away: {}</p>",
            email.issue_category, email.car_model, email.issue_description
        )
    })
}

pub fn render_support_email(session_id: &str, message: &str) -> String {
    render(
        "support_request_email.html",
        SUPPORT_EMAIL_TEMPLATE,
        context! { session_id => session_id, message => message },
    )
    .unwrap_or_else(|| format!("<p>Session {session_id} asked for a human: {message}</p>"))
}
