use crate::models::Event;
use itertools::Itertools;
use std::collections::HashSet;

/// `title|start|venue`, case-insensitive on the title.
pub fn dedupe_key(event: &Event) -> String {
    format!(
        "{}|{}|{}",
        event.title.to_lowercase(),
        event.start_date.format("%Y-%m-%dT%H:%M:%S"),
        event.venue.name
    )
}

/// Keep the first occurrence of each event, matched by key or by id.
pub fn dedupe(events: Vec<Event>) -> Vec<Event> {
    let mut ids = HashSet::new();
    events
        .into_iter()
        .unique_by(dedupe_key)
        .filter(|e| ids.insert(e.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Season, Status, Venue};
    use chrono::{NaiveDate, Utc};

    fn event(id: &str, title: &str, day: u32) -> Event {
        let start = NaiveDate::from_ymd_opt(2026, 7, day)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        Event {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            categories: vec![],
            start_date: start,
            end_date: start,
            venue: Venue {
                name: "Rickshaw Theatre".into(),
                ..Default::default()
            },
            city: "Vancouver".into(),
            location: "Vancouver, British Columbia".into(),
            image_url: None,
            official_website: String::new(),
            price: String::new(),
            source: "rickshaw-theatre".into(),
            source_url: String::new(),
            season: Season::Summer,
            status: Status::Upcoming,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_dedupe_by_key_case_insensitive() {
        let out = dedupe(vec![
            event("a", "Punk Night", 3),
            event("b", "PUNK NIGHT", 3),
            event("c", "Punk Night", 4),
        ]);
        assert_eq!(out.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["a", "c"]);
    }

    #[test]
    fn test_dedupe_by_id() {
        let out = dedupe(vec![event("a", "Punk Night", 3), event("a", "Other Show", 5)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Punk Night");
    }
}
