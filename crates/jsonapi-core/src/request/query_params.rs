//! Query string parsing for JSON:API's bracket-notation parameters:
//! `include`, `fields[type]`, `filter[field]`/`filter[field][op]`, `sort`,
//! and `page[number|size|after|before]`.
//!
//! Unlike PostgREST's `col.eq.val` operator grammar — which justifies a
//! combinator parser — every key here is a flat `key=value` pair once the
//! bracket suffix is split off, so a handwritten scanner is all this needs.

use super::types::*;
use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;

/// Parse a raw query string into [`QueryParams`].
pub fn parse_query_params(query: &str) -> Result<QueryParams> {
    let mut params = QueryParams::default();

    if query.is_empty() {
        return Ok(params);
    }

    let mut pairs: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            Some((parts.next()?, parts.next().unwrap_or("")))
        })
        .collect();
    pairs.sort_by_key(|(k, _)| *k);
    params.canonical = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    for (raw_key, raw_value) in pairs {
        let value = percent_decode_str(raw_value)
            .decode_utf8()
            .map_err(|_| Error::Payload(format!("invalid percent-encoding in '{raw_key}'")))?
            .to_string();

        if raw_key == "include" {
            params.include = parse_include(&value);
        } else if raw_key == "sort" {
            params.sort = parse_sort(&value)?;
        } else if let Some(type_name) = bracket_suffix(raw_key, "fields") {
            params
                .fields
                .insert(type_name.to_string(), value.split(',').map(str::to_string).collect());
        } else if let Some(rest) = raw_key.strip_prefix("page[") {
            let key = rest
                .strip_suffix(']')
                .ok_or_else(|| Error::Payload(format!("malformed page parameter '{raw_key}'")))?;
            apply_page_param(&mut params.page, key, &value)?;
        } else if let Some(rest) = raw_key.strip_prefix("filter[") {
            let term = parse_filter_term(rest, &value)?;
            params.filters.push(term);
        }
        // Unrecognized parameters are ignored rather than erroring, matching
        // the spec's stance that strict query validation happens during
        // pipeline validation, not at the raw query-string layer.
    }

    Ok(params)
}

/// `include=author,comments.author` -> `[["author"], ["comments", "author"]]`
fn parse_include(value: &str) -> Vec<IncludePath> {
    if value.is_empty() {
        return vec![];
    }
    value
        .split(',')
        .map(|path| path.split('.').map(str::to_string).collect())
        .collect()
}

/// `sort=-created-at,title` -> two `SortTerm`s.
fn parse_sort(value: &str) -> Result<Vec<SortTerm>> {
    if value.is_empty() {
        return Ok(vec![]);
    }
    value.split(',').map(parse_sort_term).collect()
}

fn parse_sort_term(raw: &str) -> Result<SortTerm> {
    let (direction, field_path) = match raw.strip_prefix('-') {
        Some(rest) => (SortDirection::Desc, rest),
        None => (SortDirection::Asc, raw),
    };
    if field_path.is_empty() {
        return Err(Error::Payload("empty sort term".into()));
    }
    let mut segments: Vec<String> = field_path.split('.').map(str::to_string).collect();
    let field = segments.pop().unwrap();
    Ok(SortTerm {
        path: segments,
        field,
        direction,
    })
}

/// Extract `X` out of `prefix[X]` for keys shaped like `fields[articles]`.
fn bracket_suffix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?.strip_prefix('[')?.strip_suffix(']')
}

fn apply_page_param(page: &mut PageParams, key: &str, value: &str) -> Result<()> {
    match key {
        "number" => {
            page.number = Some(
                value
                    .parse()
                    .map_err(|_| Error::InvalidCursor(format!("page[number]='{value}'")))?,
            );
        }
        "size" => {
            page.size = Some(
                value
                    .parse()
                    .map_err(|_| Error::InvalidCursor(format!("page[size]='{value}'")))?,
            );
        }
        "after" => page.after = Some(value.to_string()),
        "before" => page.before = Some(value.to_string()),
        other => {
            return Err(Error::Payload(format!("unknown page parameter 'page[{other}]'")));
        }
    }
    Ok(())
}

/// `filter[author.name][like]=Jane` -> path=["author"], field="name", op=Like
/// `filter[title]=eq.Foo` (bare field, operator folded into the value as
/// `op.value` the way PostgREST does it) is NOT supported — JSON:API filter
/// values are either a bare equality value or use the `filter[field][op]`
/// bracket form exclusively, so the key alone disambiguates.
fn parse_filter_term(rest: &str, value: &str) -> Result<FilterTerm> {
    let key = rest
        .strip_suffix(']')
        .ok_or_else(|| Error::Payload(format!("malformed filter parameter 'filter[{rest}'")))?;

    // key is either "field" or "field][op" (since we stripped one trailing ])
    let (field_path, operator) = if let Some((field_part, op_part)) = key.rsplit_once("][") {
        let op = FilterOperator::from_token(op_part)
            .ok_or_else(|| Error::Payload(format!("unknown filter operator '{op_part}'")))?;
        (field_part, op)
    } else {
        (key, FilterOperator::Eq)
    };

    let mut segments: Vec<String> = field_path.split('.').map(str::to_string).collect();
    let field = segments
        .pop()
        .ok_or_else(|| Error::Payload("empty filter field".into()))?;

    let filter_value = match operator {
        FilterOperator::In => FilterValue::List(value.split(',').map(str::to_string).collect()),
        FilterOperator::Between => {
            let parts: Vec<String> = value.split(',').map(str::to_string).collect();
            if parts.len() != 2 {
                return Err(Error::Payload(format!(
                    "filter[{field_path}][between] requires exactly two comma-separated values"
                )));
            }
            FilterValue::List(parts)
        }
        _ => FilterValue::Scalar(value.to_string()),
    };

    Ok(FilterTerm {
        path: segments,
        field,
        operator,
        value: filter_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_include() {
        let params = parse_query_params("include=author,comments.author").unwrap();
        assert_eq!(params.include, vec![vec!["author".to_string()], vec!["comments".to_string(), "author".to_string()]]);
    }

    #[test]
    fn test_parse_fields() {
        let params = parse_query_params("fields%5Barticles%5D=title,body").unwrap();
        assert_eq!(params.fields.get("articles").unwrap(), &vec!["title".to_string(), "body".to_string()]);
    }

    #[test]
    fn test_parse_sort() {
        let params = parse_query_params("sort=-created-at,title").unwrap();
        assert_eq!(params.sort.len(), 2);
        assert_eq!(params.sort[0].field, "created-at");
        assert_eq!(params.sort[0].direction, SortDirection::Desc);
        assert_eq!(params.sort[1].direction, SortDirection::Asc);
    }

    #[test]
    fn test_parse_page() {
        let params = parse_query_params("page%5Bnumber%5D=2&page%5Bsize%5D=10").unwrap();
        assert_eq!(params.page.number, Some(2));
        assert_eq!(params.page.size, Some(10));
    }

    #[test]
    fn test_parse_simple_filter_defaults_to_eq() {
        let params = parse_query_params("filter%5Btitle%5D=Hello").unwrap();
        assert_eq!(params.filters.len(), 1);
        assert_eq!(params.filters[0].operator, FilterOperator::Eq);
        assert_eq!(params.filters[0].field, "title");
    }

    #[test]
    fn test_parse_filter_with_operator_and_path() {
        let params = parse_query_params("filter%5Bauthor.name%5D%5Blike%5D=Jane").unwrap();
        let term = &params.filters[0];
        assert_eq!(term.path, vec!["author".to_string()]);
        assert_eq!(term.field, "name");
        assert_eq!(term.operator, FilterOperator::Like);
    }

    #[test]
    fn test_parse_filter_in_list() {
        let params = parse_query_params("filter%5Bid%5D%5Bin%5D=1,2,3").unwrap();
        match &params.filters[0].value {
            FilterValue::List(values) => assert_eq!(values, &vec!["1".to_string(), "2".to_string(), "3".to_string()]),
            _ => panic!("expected list value"),
        }
    }
}
