use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::User;

/// Highest page number a query may ask for.
pub const MAX_PAGE: u32 = 1000;

/// Largest page size a query may ask for.
pub const MAX_LIMIT: u32 = 50;

/// Query parameters for searching the directory.
///
/// Empty strings and `None` mean "no constraint".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserFilter {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(
        default,
        deserialize_with = "crate::serde::deserialize_optional_timestamp"
    )]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

impl UserFilter {
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_created_after(mut self, created_after: DateTime<Utc>) -> Self {
        self.created_after = Some(created_after);
        self
    }

    pub fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    /// Returns a copy with paging clamped into range.
    ///
    /// Out-of-range values fall back to 1 rather than to the nearest bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use userdir_core::user::UserFilter;
    ///
    /// let filter = UserFilter::default().with_page(0, 500).normalized();
    /// assert_eq!((filter.page, filter.limit), (1, 1));
    ///
    /// let filter = UserFilter::default().with_page(3, 20).normalized();
    /// assert_eq!((filter.page, filter.limit), (3, 20));
    /// ```
    pub fn normalized(mut self) -> Self {
        if !(1..=MAX_PAGE).contains(&self.page) {
            self.page = 1;
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            self.limit = 1;
        }
        self
    }

    /// Number of matching records to skip before the requested page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Returns true if the user satisfies every constraint of the filter.
///
/// Paging is ignored here; see [`apply_filter`].
pub fn matches_filter(user: &User, filter: &UserFilter) -> bool {
    (filter.country.is_empty() || contains_ignore_case(&user.country, &filter.country))
        && (filter.nickname.is_empty() || contains_ignore_case(&user.nickname, &filter.nickname))
        && filter
            .created_after
            .is_none_or(|after| user.created_at > after)
}

/// Filters users and returns the requested page of the matches.
///
/// The filter is normalized first, so out-of-range paging never yields an
/// error.
pub fn apply_filter<'a>(users: impl IntoIterator<Item = &'a User>, filter: &UserFilter) -> Vec<User> {
    let filter = filter.clone().normalized();
    users
        .into_iter()
        .filter(|user| matches_filter(user, &filter))
        .skip(filter.offset())
        .take(filter.limit as usize)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::NewUser;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn user(nickname: &str, country: &str, days: i64) -> User {
        User::from_new(
            NewUser::new(nickname).with_country(country),
            base_time() + Duration::days(days),
        )
    }

    #[test]
    fn test_normalized_keeps_valid_paging() {
        let filter = UserFilter::default().with_page(1000, 50).normalized();
        assert_eq!(filter.page, 1000);
        assert_eq!(filter.limit, 50);
    }

    #[test]
    fn test_normalized_resets_out_of_range_paging() {
        let filter = UserFilter::default().with_page(1001, 51).normalized();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 1);
    }

    #[test]
    fn test_offset() {
        let filter = UserFilter::default().with_page(3, 10);
        assert_eq!(filter.offset(), 20);
    }

    #[test]
    fn test_matches_country_case_insensitive_substring() {
        let u = user("meepo", "United Kingdom", 0);

        assert!(matches_filter(&u, &UserFilter::default().with_country("kingdom")));
        assert!(!matches_filter(&u, &UserFilter::default().with_country("France")));
    }

    #[test]
    fn test_matches_nickname_case_insensitive_substring() {
        let u = user("MeepoTheGeomancer", "UK", 0);

        assert!(matches_filter(&u, &UserFilter::default().with_nickname("meepo")));
        assert!(!matches_filter(&u, &UserFilter::default().with_nickname("pudge")));
    }

    #[test]
    fn test_created_after_is_strict() {
        let u = user("meepo", "UK", 1);
        let exactly = base_time() + Duration::days(1);

        assert!(!matches_filter(&u, &UserFilter::default().with_created_after(exactly)));
        assert!(matches_filter(
            &u,
            &UserFilter::default().with_created_after(base_time())
        ));
    }

    #[test]
    fn test_deserialize_query_with_blank_fields() {
        let json = r#"{"country": "UK", "created_after": "", "page": 2}"#;
        let filter: UserFilter = serde_json::from_str(json).unwrap();

        assert_eq!(filter.country, "UK");
        assert_eq!(filter.created_after, None);
        assert_eq!((filter.page, filter.limit), (2, 0));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches_filter(&user("a", "b", 0), &UserFilter::default()));
    }

    #[test]
    fn test_apply_filter_paginates_matches() {
        let users: Vec<User> = (0..5).map(|i| user(&format!("uk{i}"), "UK", i)).collect();
        let mut all = users.clone();
        all.push(user("fr0", "FR", 0));

        let page = apply_filter(&all, &UserFilter::default().with_country("uk").with_page(2, 2));

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].nickname, "uk2");
        assert_eq!(page[1].nickname, "uk3");
    }

    #[test]
    fn test_apply_filter_default_paging_returns_one() {
        let users: Vec<User> = (0..3).map(|i| user(&format!("u{i}"), "UK", i)).collect();

        let page = apply_filter(&users, &UserFilter::default());

        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_apply_filter_past_the_end_is_empty() {
        let users: Vec<User> = (0..3).map(|i| user(&format!("u{i}"), "UK", i)).collect();

        let page = apply_filter(&users, &UserFilter::default().with_page(5, 10));

        assert!(page.is_empty());
    }
}
