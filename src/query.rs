//! Filter normalization: the same pattern and condition semantics on every
//! backend, whatever the backend can evaluate natively.
//!
//! A [`Filter`] is normalized into a [`CompiledFilter`], a conjunction of
//! per-field predicates:
//!
//! - a string matcher is a regular expression anchored at the start of the
//!   stringified field value (prefix semantics, not a search);
//! - any other matcher is an equality test (`Int` and `Float` compare by
//!   number).
//!
//! A field missing from a value fails its predicate. [`Field::Whole`]
//! addresses the entire value when it is a scalar or a list. On a record it
//! addresses the reserved [`WHOLE_VALUE_FIELD`] instead, so a whole-value
//! matcher never matches the rendering of a record that lacks that field.

use derive_more::From;
use log::trace;
use regex::Regex;

use crate::codec::Codec;
use crate::errors::UnikvResult;
use crate::traits::backend::RawEntry;
use crate::value::Value;

/// Record field that stands in for the whole value of a record.
pub const WHOLE_VALUE_FIELD: &str = "VALUE__";

/// Which part of a stored value a condition looks at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, From)]
pub enum Field {
    /// The value itself.
    Whole,
    /// A named field of a structured record.
    #[from]
    Named(String),
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::Named(name.to_owned())
    }
}

/// Caller-facing filter argument for conditional scans.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    /// No conditions; every entry passes.
    #[default]
    All,
    /// Match the whole value against a single matcher.
    ValueEquals(Value),
    /// Every `(field, matcher)` pair must pass.
    FieldConditions(Vec<(Field, Value)>),
}

impl Filter {
    pub fn value(matcher: impl Into<Value>) -> Self {
        Filter::ValueEquals(matcher.into())
    }

    pub fn field(field: impl Into<Field>, matcher: impl Into<Value>) -> Self {
        Filter::FieldConditions(vec![(field.into(), matcher.into())])
    }

    /// Add one more condition; conditions combine with logical AND.
    pub fn and(self, field: impl Into<Field>, matcher: impl Into<Value>) -> Self {
        let condition = (field.into(), matcher.into());
        match self {
            Filter::All => Filter::FieldConditions(vec![condition]),
            Filter::ValueEquals(whole) => {
                Filter::FieldConditions(vec![(Field::Whole, whole), condition])
            }
            Filter::FieldConditions(mut conditions) => {
                conditions.push(condition);
                Filter::FieldConditions(conditions)
            }
        }
    }

    /// Normalize into per-field predicates, compiling string patterns.
    pub fn compile(&self) -> UnikvResult<CompiledFilter> {
        let conditions: Vec<(Field, &Value)> = match self {
            Filter::All => Vec::new(),
            Filter::ValueEquals(matcher) => vec![(Field::Whole, matcher)],
            Filter::FieldConditions(conditions) => {
                conditions.iter().map(|(f, m)| (f.clone(), m)).collect()
            }
        };
        let predicates = conditions
            .into_iter()
            .map(|(field, matcher)| {
                Ok(Predicate {
                    field,
                    test: Test::from_matcher(matcher)?,
                })
            })
            .collect::<UnikvResult<Vec<_>>>()?;
        Ok(CompiledFilter { predicates })
    }
}

#[derive(Debug, Clone)]
enum Test {
    Prefix(Regex),
    Equals(Value),
}

impl Test {
    fn from_matcher(matcher: &Value) -> UnikvResult<Self> {
        Ok(match matcher {
            Value::Str(pattern) => Test::Prefix(anchored(pattern)?),
            other => Test::Equals(other.clone()),
        })
    }

    fn passes(&self, target: &Value) -> bool {
        match self {
            Test::Prefix(re) => re.is_match(&target.to_string()),
            Test::Equals(expected) => target.loose_eq(expected),
        }
    }
}

#[derive(Debug, Clone)]
struct Predicate {
    field: Field,
    test: Test,
}

impl Predicate {
    fn passes(&self, value: &Value) -> bool {
        let target = match &self.field {
            Field::Whole if matches!(value, Value::Map(_)) => value.field(WHOLE_VALUE_FIELD),
            Field::Whole => Some(value),
            Field::Named(name) => value.field(name),
        };
        target.is_some_and(|t| self.test.passes(t))
    }
}

/// A filter ready to evaluate client-side.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    predicates: Vec<Predicate>,
}

impl CompiledFilter {
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, value: &Value) -> bool {
        self.predicates.iter().all(|p| p.passes(value))
    }
}

/// Compile `pattern` so it only matches at the start of the subject.
pub fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}

/// A key pattern with the same prefix semantics as field patterns.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    regex: Regex,
    literal: Option<String>,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> UnikvResult<Self> {
        let literal = (regex::escape(pattern) == pattern).then(|| pattern.to_owned());
        Ok(Self {
            regex: anchored(pattern)?,
            literal,
        })
    }

    /// The pattern itself when it has no regex syntax, i.e. it is a plain
    /// prefix a backend could scan for.
    pub fn literal_prefix(&self) -> Option<&str> {
        self.literal.as_deref()
    }

    pub fn matches(&self, key: &Value) -> bool {
        self.regex.is_match(&key.to_string())
    }
}

fn take_slot(remaining: &mut Option<usize>) -> bool {
    match remaining {
        Some(0) => false,
        Some(n) => {
            *n -= 1;
            true
        }
        None => true,
    }
}

/// Lazily decodes and pattern-matches keys from a raw entry stream.
pub struct KeyScan<'a, I> {
    entries: I,
    codec: &'a Codec,
    pattern: Option<KeyPattern>,
    remaining: Option<usize>,
}

impl<'a, I> KeyScan<'a, I> {
    pub fn new(entries: I, codec: &'a Codec, pattern: Option<KeyPattern>, limit: Option<usize>) -> Self {
        Self {
            entries,
            codec,
            pattern,
            remaining: limit,
        }
    }
}

impl<I> Iterator for KeyScan<'_, I>
where
    I: Iterator<Item = UnikvResult<RawEntry>>,
{
    type Item = UnikvResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            let (raw_key, _) = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            let key = match self.codec.decode_key(&raw_key) {
                Ok(key) => key,
                Err(e) => return Some(Err(e)),
            };
            if self.pattern.as_ref().is_some_and(|p| !p.matches(&key)) {
                continue;
            }
            take_slot(&mut self.remaining);
            return Some(Ok(key));
        }
    }
}

/// Lazily decodes entries and keeps those passing a key pattern and a
/// compiled filter, stopping after `limit` passing entries.
pub struct EntryScan<'a, I> {
    entries: I,
    codec: &'a Codec,
    pattern: Option<KeyPattern>,
    filter: CompiledFilter,
    remaining: Option<usize>,
}

impl<'a, I> EntryScan<'a, I> {
    pub fn new(
        entries: I,
        codec: &'a Codec,
        pattern: Option<KeyPattern>,
        filter: CompiledFilter,
        limit: Option<usize>,
    ) -> Self {
        Self {
            entries,
            codec,
            pattern,
            filter,
            remaining: limit,
        }
    }
}

impl<I> Iterator for EntryScan<'_, I>
where
    I: Iterator<Item = UnikvResult<RawEntry>>,
{
    type Item = UnikvResult<(Value, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            let (raw_key, raw_value) = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            let key = match self.codec.decode_key(&raw_key) {
                Ok(key) => key,
                Err(e) => return Some(Err(e)),
            };
            if self.pattern.as_ref().is_some_and(|p| !p.matches(&key)) {
                continue;
            }
            let value = match self.codec.decode_value(&raw_value) {
                Ok(value) => value,
                Err(e) => return Some(Err(e)),
            };
            if !self.filter.matches(&value) {
                trace!("filter rejected key {key}");
                continue;
            }
            take_slot(&mut self.remaining);
            return Some(Ok((key, value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;

    fn person(a: i64, b: &str) -> Value {
        Value::record([("a", Value::from(a)), ("b", Value::from(b))])
    }

    #[test]
    fn string_matcher_is_a_prefix_pattern() {
        let filter = Filter::value("ab").compile().unwrap();
        assert!(filter.matches(&Value::from("abc")));
        assert!(!filter.matches(&Value::from("cab")));
    }

    #[test]
    fn string_matcher_supports_regex_syntax() {
        let filter = Filter::value("a[0-9]+").compile().unwrap();
        assert!(filter.matches(&Value::from("a12x")));
        assert!(!filter.matches(&Value::from("ab")));
    }

    #[test]
    fn string_matcher_applies_to_stringified_numbers() {
        let filter = Filter::value("1").compile().unwrap();
        assert!(filter.matches(&Value::from(17)));
        assert!(!filter.matches(&Value::from(71)));
    }

    #[test]
    fn non_string_matcher_is_equality() {
        let filter = Filter::value(5).compile().unwrap();
        assert!(filter.matches(&Value::from(5)));
        assert!(filter.matches(&Value::from(5.0)));
        assert!(!filter.matches(&Value::from(55)));
    }

    #[test]
    fn conditions_combine_with_and() {
        let filter = Filter::field("a", 1).and("b", "2").compile().unwrap();
        assert!(filter.matches(&person(1, "25")));
        assert!(!filter.matches(&person(1, "32")));
        assert!(!filter.matches(&person(2, "2")));
    }

    #[test]
    fn missing_field_fails_without_error() {
        let filter = Filter::field("missing", 1).compile().unwrap();
        assert!(!filter.matches(&person(1, "2")));
        assert!(!filter.matches(&Value::from(1)));
    }

    #[test]
    fn whole_field_aliases_scalars() {
        let filter = Filter::field(Field::Whole, "x").compile().unwrap();
        assert!(filter.matches(&Value::from("xyz")));
    }

    #[test]
    fn whole_value_matchers_skip_records() {
        let record = Value::record([("a", 1)]);
        assert!(!Filter::value("\\{").compile().unwrap().matches(&record));
        assert!(!Filter::value("").compile().unwrap().matches(&record));
        assert!(!Filter::value(record.clone()).compile().unwrap().matches(&record));
    }

    #[test]
    fn whole_value_field_stands_in_for_a_record() {
        let record =
            Value::record([(WHOLE_VALUE_FIELD, Value::from("abc")), ("b", Value::from(2))]);
        assert!(Filter::value("ab").compile().unwrap().matches(&record));
        assert!(Filter::value("ab").and("b", 2).compile().unwrap().matches(&record));
        assert!(!Filter::value("b").compile().unwrap().matches(&record));
    }

    #[test]
    fn empty_filter_passes_everything() {
        let filter = Filter::All.compile().unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&Value::Null));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(Filter::value("(").compile().is_err());
        assert!(KeyPattern::new("[").is_err());
    }

    #[test]
    fn literal_prefix_detection() {
        assert_eq!(KeyPattern::new("user_").unwrap().literal_prefix(), Some("user_"));
        assert_eq!(KeyPattern::new("user.*").unwrap().literal_prefix(), None);
    }

    #[test]
    fn entry_scan_limits_passing_entries_only() {
        let codec = Codec::new(CodecConfig::default());
        let raw: Vec<UnikvResult<RawEntry>> = (0..10)
            .map(|i| {
                Ok((
                    codec.encode_key(&Value::from(i)).unwrap(),
                    codec.encode_value(&Value::from(i % 2)).unwrap(),
                ))
            })
            .collect();
        let filter = Filter::value(1).compile().unwrap();
        let keys: Vec<Value> = EntryScan::new(raw.into_iter(), &codec, None, filter, Some(3))
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![Value::from(1), Value::from(3), Value::from(5)]);
    }

    #[test]
    fn key_scan_matches_stringified_keys() {
        let codec = Codec::new(CodecConfig::default());
        let raw: Vec<UnikvResult<RawEntry>> = (0..20)
            .map(|i| Ok((codec.encode_key(&Value::from(i)).unwrap(), Vec::new())))
            .collect();
        let pattern = KeyPattern::new("1").unwrap();
        let keys: Vec<Value> = KeyScan::new(raw.into_iter(), &codec, Some(pattern), None)
            .collect::<UnikvResult<_>>()
            .unwrap();
        assert_eq!(keys.len(), 11);
        assert!(keys.iter().all(|k| k.to_string().starts_with('1')));
    }
}
