//! Provider matching: distance, category filtering and rating arithmetic.

use serde::Serialize;

use crate::types::{Coordinates, MatchedProvider, Provider, ProviderRating};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Leads are offered to this many providers.
pub const LEAD_MATCH_LIMIT: usize = 3;
pub const TOOL_RESULT_LIMIT: usize = 5;
/// Sort key for tool results that have no distance.
const UNKNOWN_DISTANCE_KM: f64 = 999.0;

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

fn distance_from(origin: Coordinates, provider: &Provider) -> f64 {
    haversine_km(origin.lat, origin.lng, provider.latitude, provider.longitude)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Category the issue parser falls back to when it cannot classify.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Case-insensitive substring match against any listed service. An empty or
/// unclassified category matches any provider with at least one service.
pub fn offers_category(provider: &Provider, category: &str) -> bool {
    let category = category.trim();
    let needle = if category.eq_ignore_ascii_case(FALLBACK_CATEGORY) {
        String::new()
    } else {
        category.to_lowercase()
    };
    provider
        .services
        .iter()
        .any(|service| service.to_lowercase().contains(&needle))
}

pub fn match_providers_for_lead(
    providers: &[Provider],
    category: &str,
    origin: Coordinates,
) -> Vec<MatchedProvider> {
    let mut matched = providers
        .iter()
        .filter(|p| offers_category(p, category))
        .map(|p| MatchedProvider {
            id: p.id.clone(),
            name: p.name.clone(),
            email: p.email.clone(),
            distance: distance_from(origin, p),
        })
        .collect::<Vec<_>>();
    matched.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    matched.truncate(LEAD_MATCH_LIMIT);
    matched
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyProvider {
    pub id: String,
    pub name: String,
    pub services: Vec<String>,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub rating: f64,
    pub distance: f64,
}

pub fn rank_by_distance(providers: &[Provider], origin: Coordinates) -> Vec<NearbyProvider> {
    let mut ranked = providers
        .iter()
        .map(|p| NearbyProvider {
            id: p.id.clone(),
            name: p.name.clone(),
            services: p.services.clone(),
            email: p.email.clone(),
            phone: p.phone.clone(),
            address: p.address.clone(),
            rating: p.rating.unwrap_or(0.0),
            distance: distance_from(origin, p),
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked
}

/// Provider shape handed back to the voice agent's tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolProvider {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub services: Vec<String>,
    pub rating: f64,
    pub distance_km: Option<f64>,
}

pub fn find_for_tool(
    providers: &[Provider],
    category: &str,
    origin: Coordinates,
) -> Vec<ToolProvider> {
    let category = category.trim();
    let has_coords = origin.lat != 0.0 || origin.lng != 0.0;

    let mut found = providers
        .iter()
        .filter(|p| category.is_empty() || offers_category(p, category))
        .map(|p| ToolProvider {
            name: p.name.clone(),
            phone: p.phone.clone(),
            email: p.email.clone(),
            address: p.address.clone(),
            services: p.services.clone(),
            rating: p.rating.unwrap_or(0.0),
            distance_km: has_coords.then(|| round_to(distance_from(origin, p), 2)),
        })
        .collect::<Vec<_>>();

    if has_coords {
        found.sort_by(|a, b| {
            let left = a.distance_km.unwrap_or(UNKNOWN_DISTANCE_KM);
            let right = b.distance_km.unwrap_or(UNKNOWN_DISTANCE_KM);
            left.total_cmp(&right)
        });
    } else {
        found.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    }
    found.truncate(TOOL_RESULT_LIMIT);
    found
}

/// First `limit` providers offering the category, in store order.
pub fn top_for_category<'a>(
    providers: &'a [Provider],
    category: &str,
    limit: usize,
) -> Vec<&'a Provider> {
    providers
        .iter()
        .filter(|p| offers_category(p, category))
        .take(limit)
        .collect()
}

/// Mean rating rounded to one decimal, `0.0` without ratings.
pub fn average_rating(ratings: &[ProviderRating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total = ratings.iter().map(|r| r.rating).sum::<f64>();
    round_to(total / ratings.len() as f64, 1)
}
