use hyper::HeaderMap;

/// A collection of headers that can be looked up by name.
///
/// Lookups follow HTTP semantics as seen by the collector: a header whose value is empty is
/// treated the same as a header that is not present at all.
pub trait HeaderSource {
    /// Gets the first value of the header `name`, if present and non-empty.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        // Invalid header names and non-UTF-8 values are both treated as absent.
        self.get(name)
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
            .filter(|value| !value.is_empty())
    }
}

impl<T> HeaderSource for &T
where
    T: HeaderSource + ?Sized,
{
    fn header(&self, name: &str) -> Option<&str> {
        (**self).header(name)
    }
}

/// The labels of a single series, in configured header order.
///
/// Every configured header has an entry, even when the exchange did not carry it: missing headers
/// map to the empty string.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct LabelSet(Vec<(String, String)>);

impl LabelSet {
    /// Resolves the labels for one exchange.
    ///
    /// Each header in `headers` is looked up on `request` first, then on `response`.
    pub fn resolve<Req, Resp>(headers: &[String], request: &Req, response: &Resp) -> Self
    where
        Req: HeaderSource + ?Sized,
        Resp: HeaderSource + ?Sized,
    {
        let labels = headers
            .iter()
            .map(|name| {
                let value = request.header(name).or_else(|| response.header(name)).unwrap_or("");
                (name.clone(), value.to_string())
            })
            .collect();

        LabelSet(labels)
    }

    /// Gets the value recorded for the label `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Iterates over the labels as `(name, value)` pairs, in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Returns `true` if any label carries a non-empty value.
    pub fn any_present(&self) -> bool {
        self.0.iter().any(|(_, value)| !value.is_empty())
    }

    /// Gets the number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        LabelSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Derives the store key for the series identified by `name` and `labels`.
///
/// The key is the metric name followed by `_<header>_<value>` for every label, in label order.
///
/// Keys are not escaped, so distinct label sets can map to the same key when values contain `_`
/// followed by a configured header name: with headers `[A, B]`, `A="1_B", B=""` and
/// `A="1", B="B_"` both give `<name>_A_1_B_B_`.  Observations for such label sets share the series
/// created first, which keeps the labels it was created with.
pub fn series_key(name: &str, labels: &LabelSet) -> String {
    let capacity = labels.iter().fold(name.len(), |acc, (k, v)| acc + k.len() + v.len() + 2);

    let mut key = String::with_capacity(capacity);
    key.push_str(name);
    for (header, value) in labels.iter() {
        key.push('_');
        key.push_str(header);
        key.push('_');
        key.push_str(value);
    }
    key
}

#[cfg(test)]
mod tests {
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::HeaderMap;
    use proptest::prelude::*;

    use super::{series_key, HeaderSource, LabelSet};

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    fn configured(headers: &[&str]) -> Vec<String> {
        headers.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_header_map_lookup() {
        let mut map = header_map(&[("X-User-ID", "user123"), ("X-Empty", ""), ("X-Multi", "a")]);
        map.append("x-multi", HeaderValue::from_static("b"));

        assert_eq!(map.header("x-user-id"), Some("user123"));
        assert_eq!(map.header("X-USER-ID"), Some("user123"));
        assert_eq!(map.header("X-Empty"), None);
        assert_eq!(map.header("X-Multi"), Some("a"));
        assert_eq!(map.header("X-Missing"), None);
        assert_eq!(map.header("not a header name"), None);
    }

    #[test]
    fn test_header_map_lookup_non_ascii_utf8() {
        let mut request = HeaderMap::new();
        request.insert("x-user", HeaderValue::from_bytes("José".as_bytes()).unwrap());
        request.insert("x-raw", HeaderValue::from_bytes(b"\xff\xfe").unwrap());
        let response = header_map(&[("X-User", "fallback"), ("X-Raw", "fallback")]);

        assert_eq!(request.header("X-User"), Some("José"));
        assert_eq!(request.header("X-Raw"), None);

        let labels = LabelSet::resolve(&configured(&["X-User", "X-Raw"]), &request, &response);
        assert_eq!(labels.get("X-User"), Some("José"));
        assert_eq!(labels.get("X-Raw"), Some("fallback"));
    }

    #[test]
    fn test_resolve_prefers_request() {
        let request = header_map(&[("X-Tenant", "from-request")]);
        let response = header_map(&[("X-Tenant", "from-response"), ("X-Response-ID", "resp123")]);

        let labels = LabelSet::resolve(
            &configured(&["X-Tenant", "X-Response-ID", "X-Missing"]),
            &request,
            &response,
        );

        let resolved = labels.iter().collect::<Vec<_>>();
        assert_eq!(
            resolved,
            vec![("X-Tenant", "from-request"), ("X-Response-ID", "resp123"), ("X-Missing", "")]
        );
        assert_eq!(labels.get("X-Missing"), Some(""));
        assert_eq!(labels.get("X-Other"), None);
        assert!(labels.any_present());
    }

    #[test]
    fn test_resolve_empty_request_value_falls_back_to_response() {
        let request = header_map(&[("X-Tenant", "")]);
        let response = header_map(&[("X-Tenant", "acme")]);

        let labels = LabelSet::resolve(&configured(&["X-Tenant"]), &request, &response);
        assert_eq!(labels.get("X-Tenant"), Some("acme"));
    }

    #[test]
    fn test_resolve_all_missing() {
        let empty = HeaderMap::new();
        let labels = LabelSet::resolve(&configured(&["X-A", "X-B"]), &empty, &empty);

        assert_eq!(labels.len(), 2);
        assert!(!labels.any_present());
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec![("X-A", ""), ("X-B", "")]);
    }

    #[test]
    fn test_series_key_known_cases() {
        let cases = vec![
            ("c", vec![("X-User-ID", "user123")], "c_X-User-ID_user123"),
            ("c", vec![("X-User-ID", "")], "c_X-User-ID_"),
            ("m", vec![("A", "1"), ("B", "2")], "m_A_1_B_2"),
            ("m", vec![("B", "2"), ("A", "1")], "m_B_2_A_1"),
            ("m", vec![], "m"),
        ];

        for (name, labels, expected) in cases {
            let labels = labels.into_iter().collect::<LabelSet>();
            assert_eq!(series_key(name, &labels), expected);
        }
    }

    #[test]
    fn test_series_key_collision_without_escaping() {
        let first = [("A", "1_B"), ("B", "")].into_iter().collect::<LabelSet>();
        let second = [("A", "1"), ("B", "B_")].into_iter().collect::<LabelSet>();

        assert_ne!(first, second);
        assert_eq!(series_key("m", &first), series_key("m", &second));
    }

    proptest! {
        #[test]
        fn test_series_key_is_deterministic(
            name in "[a-z_]{1,16}",
            labels in proptest::collection::vec(("[A-Za-z-]{1,12}", ".{0,16}"), 0..6),
        ) {
            let first = labels.iter().cloned().collect::<LabelSet>();
            let second = labels.iter().cloned().collect::<LabelSet>();

            let key = series_key(&name, &first);
            prop_assert_eq!(&key, &series_key(&name, &first));
            prop_assert_eq!(&key, &series_key(&name, &second));
            prop_assert!(key.starts_with(name.as_str()));
        }
    }
}
