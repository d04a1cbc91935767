use handle_errors::Error;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq)]
pub struct PageSettings {
    pub public_url: String,
    pub page_size: i64,
    pub max_page_size: i64,
}

/// Raw query pairs in request order. Repeated keys are kept.
pub type Query = Vec<(String, String)>;

pub fn query_param<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn query_values<'a>(query: &'a [(String, String)], key: &str) -> Vec<&'a str> {
    query
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

/// Reads an optional positive integer parameter such as `recipes_limit`.
pub fn positive_param(
    query: &[(String, String)],
    key: &'static str,
) -> Result<Option<i64>, Error> {
    match query_param(query, key) {
        None | Some("") => Ok(None),
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            Ok(_) => Err(Error::validation(key, "Ensure this value is greater than 0.")),
            Err(e) => Err(Error::ParseError(e)),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// `page` must be a positive integer; a bad `limit` falls back to the
    /// configured page size and is capped at the maximum.
    pub fn from_query(query: &[(String, String)], settings: &PageSettings) -> Result<Self, Error> {
        let page = match query_param(query, "page") {
            None | Some("") => 1,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => return Err(Error::PageNotFound),
            },
        };
        let limit = query_param(query, "limit")
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(settings.page_size)
            .min(settings.max_page_size);
        // A page whose first row lies beyond i64 cannot exist.
        if (page - 1).checked_mul(limit).is_none() {
            return Err(Error::PageNotFound);
        }
        Ok(PageRequest { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(
        results: Vec<T>,
        count: i64,
        request: PageRequest,
        path: &str,
        query: &[(String, String)],
        settings: &PageSettings,
    ) -> Result<Self, Error> {
        let last = ((count + request.limit - 1) / request.limit).max(1);
        if request.page > last {
            return Err(Error::PageNotFound);
        }
        let link = |page: i64| page_link(&settings.public_url, path, query, page);
        Ok(Page {
            count,
            next: (request.page < last).then(|| link(request.page + 1)),
            previous: (request.page > 1).then(|| link(request.page - 1)),
            results,
        })
    }
}

fn page_link(base: &str, path: &str, query: &[(String, String)], page: i64) -> String {
    let mut pairs: Vec<(&str, String)> = query
        .iter()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    if page > 1 {
        pairs.push(("page", page.to_string()));
    }
    if pairs.is_empty() {
        return format!("{}{}", base, path);
    }
    let encoded = pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_VALUE),
                utf8_percent_encode(v, QUERY_VALUE)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}{}?{}", base, path, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PageSettings {
        PageSettings {
            public_url: "http://localhost".to_string(),
            page_size: 6,
            max_page_size: 50,
        }
    }

    fn query(pairs: &[(&str, &str)]) -> Query {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_first_page_of_configured_size() {
        let request = PageRequest::from_query(&[], &settings()).unwrap();
        assert_eq!(request, PageRequest { page: 1, limit: 6 });
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn limit_is_capped_and_bad_limit_ignored() {
        let request = PageRequest::from_query(&query(&[("limit", "500")]), &settings()).unwrap();
        assert_eq!(request.limit, 50);
        let request = PageRequest::from_query(&query(&[("limit", "abc")]), &settings()).unwrap();
        assert_eq!(request.limit, 6);
        let request =
            PageRequest::from_query(&query(&[("page", "3"), ("limit", "10")]), &settings())
                .unwrap();
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn invalid_page_is_not_found() {
        for raw in ["0", "-1", "two"] {
            assert!(matches!(
                PageRequest::from_query(&query(&[("page", raw)]), &settings()),
                Err(Error::PageNotFound)
            ));
        }
    }

    #[test]
    fn page_with_unrepresentable_offset_is_not_found() {
        let q = query(&[("page", "9223372036854775807")]);
        assert!(matches!(
            PageRequest::from_query(&q, &settings()),
            Err(Error::PageNotFound)
        ));
        let q = query(&[("page", "9223372036854775807"), ("limit", "1")]);
        let request = PageRequest::from_query(&q, &settings()).unwrap();
        assert_eq!(request.offset(), i64::MAX - 1);
    }

    #[test]
    fn links_keep_other_parameters() {
        let q = query(&[("tags", "breakfast"), ("tags", "lunch"), ("page", "2"), ("limit", "2")]);
        let request = PageRequest::from_query(&q, &settings()).unwrap();
        let page = Page::new(vec![3, 4], 5, request, "/api/recipes/", &q, &settings()).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(
            page.next.as_deref(),
            Some("http://localhost/api/recipes/?tags=breakfast&tags=lunch&limit=2&page=3")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("http://localhost/api/recipes/?tags=breakfast&tags=lunch&limit=2")
        );
    }

    #[test]
    fn single_page_has_no_links() {
        let page = Page::new(vec![1], 1, PageRequest { page: 1, limit: 6 }, "/api/users/", &[], &settings())
            .unwrap();
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
    }

    #[test]
    fn page_past_the_end_is_rejected() {
        let result = Page::<i32>::new(Vec::new(), 4, PageRequest { page: 3, limit: 2 }, "/api/users/", &[], &settings());
        assert!(matches!(result, Err(Error::PageNotFound)));
        let empty = Page::<i32>::new(Vec::new(), 0, PageRequest { page: 1, limit: 2 }, "/api/users/", &[], &settings());
        assert!(empty.is_ok());
    }

    #[test]
    fn values_are_percent_encoded() {
        let q = query(&[("ingredients", "сах ар")]);
        let link = page_link("http://x", "/api/recipes/", &q, 2);
        assert_eq!(
            link,
            "http://x/api/recipes/?ingredients=%D1%81%D0%B0%D1%85%20%D0%B0%D1%80&page=2"
        );
    }

    #[test]
    fn positive_param_validates() {
        assert_eq!(positive_param(&query(&[("recipes_limit", "2")]), "recipes_limit").unwrap(), Some(2));
        assert_eq!(positive_param(&[], "recipes_limit").unwrap(), None);
        assert!(positive_param(&query(&[("recipes_limit", "0")]), "recipes_limit").is_err());
        assert!(positive_param(&query(&[("recipes_limit", "x")]), "recipes_limit").is_err());
    }
}
