//! # Query Parameter Parser
//!
//! Parses query-string parameters into a [`ParsedQuery`].
//!
//! Filter keys follow `{column}[->{path}...].{operator}`; the value is the
//! operand. `select`, `order`, `limit` and `offset` are reserved keys.
//! Parsing is purely syntactic; column names are checked against the schema
//! by the builder.

use url::form_urlencoded;

use super::errors::{RestError, RestResult};
use super::filter::{FilterExpression, FilterOperator, FilterValue, IsTarget, Scalar};
use super::request::{ColumnSpec, Direction, EmbedSpec, NullsOrder, OrderSpec, ParsedQuery};

/// Decode an `application/x-www-form-urlencoded` query string, keeping order
pub fn parse_query_string(query: &str) -> Vec<(String, String)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Parse an ordered parameter multimap
pub fn parse_params(params: &[(String, String)]) -> RestResult<ParsedQuery> {
    let mut parsed = ParsedQuery::default();
    let mut seen_select = false;
    let mut seen_order = false;

    for (key, value) in params {
        match key.as_str() {
            "select" => {
                reject_repeat(&mut seen_select, "select")?;
                let (columns, embeds) = parse_select(value)?;
                parsed.select = columns;
                parsed.embeds = embeds;
            }
            "order" => {
                reject_repeat(&mut seen_order, "order")?;
                parsed.order = parse_order(value)?;
            }
            "limit" => {
                if parsed.limit.is_some() {
                    return Err(RestError::validation("limit given more than once"));
                }
                parsed.limit = Some(parse_integer("limit", value)?);
            }
            "offset" => {
                if parsed.offset.is_some() {
                    return Err(RestError::validation("offset given more than once"));
                }
                parsed.offset = Some(parse_integer("offset", value)?);
            }
            _ => parsed.filters.push(parse_filter(key, value)?),
        }
    }

    Ok(parsed)
}

fn reject_repeat(seen: &mut bool, name: &str) -> RestResult<()> {
    if *seen {
        return Err(RestError::validation(format!("{} given more than once", name)));
    }
    *seen = true;
    Ok(())
}

fn parse_integer(name: &str, value: &str) -> RestResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| RestError::validation(format!("{} must be an integer", name)))
}

/// Parse `{column}[->{path}].{operator}` = `value`
pub fn parse_filter(key: &str, value: &str) -> RestResult<FilterExpression> {
    let (target, op) = key.rsplit_once('.').ok_or_else(|| {
        RestError::validation(format!("filter '{}' has no operator", key))
    })?;
    let operator = FilterOperator::parse(op)?;

    let mut segments = target.split("->");
    let column = segments.next().unwrap_or_default();
    if column.is_empty() {
        return Err(RestError::validation("filter column is empty"));
    }
    let json_path: Vec<String> = segments.map(str::to_string).collect();
    if json_path.iter().any(String::is_empty) {
        return Err(RestError::validation("empty JSON path segment"));
    }

    let value = match operator {
        FilterOperator::Is => FilterValue::Is(IsTarget::parse(value)?),
        FilterOperator::In | FilterOperator::Ov => FilterValue::List(
            split_list(value)?
                .into_iter()
                .map(Scalar::Text)
                .collect(),
        ),
        FilterOperator::Like | FilterOperator::Ilike => {
            FilterValue::Scalar(Scalar::Text(value.replace('*', "%")))
        }
        _ => FilterValue::Scalar(Scalar::Text(value.to_string())),
    };

    Ok(FilterExpression {
        column: column.to_string(),
        json_path,
        operator,
        value,
    })
}

/// Split a list operand on commas, RFC4180-style.
///
/// An item wrapped in double quotes may contain commas; `""` inside a quoted
/// item is a literal quote. Items are not trimmed.
pub fn split_list(raw: &str) -> RestResult<Vec<String>> {
    if raw.is_empty() {
        return Err(RestError::validation("list must not be empty"));
    }

    let mut items = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        let mut item = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        item.push('"');
                    }
                    Some('"') => break,
                    Some(c) => item.push(c),
                    None => return Err(RestError::validation("unterminated quote in list")),
                }
            }
            match chars.next() {
                None => {
                    items.push(item);
                    return Ok(items);
                }
                Some(',') => items.push(item),
                Some(_) => {
                    return Err(RestError::validation(
                        "quoted list item must be followed by a comma",
                    ))
                }
            }
        } else {
            loop {
                match chars.next() {
                    None => {
                        items.push(item);
                        return Ok(items);
                    }
                    Some(',') => break,
                    Some(c) => item.push(c),
                }
            }
            items.push(item);
        }
    }
}

/// Parse `select`: columns, aliases and embeds
pub fn parse_select(value: &str) -> RestResult<(Vec<ColumnSpec>, Vec<EmbedSpec>)> {
    let mut columns = Vec::new();
    let mut embeds = Vec::new();

    for item in split_respecting_parens(value)? {
        let item = item.trim();
        if item.is_empty() {
            return Err(RestError::validation("empty item in select"));
        }
        if item == "*" {
            columns.push(ColumnSpec::Star);
            continue;
        }

        // Only a colon before any embed parenthesis introduces an alias
        let head_end = item.find('(').unwrap_or(item.len());
        let (alias, rest) = match item[..head_end].find(':') {
            Some(idx) => (Some(item[..idx].trim().to_string()), item[idx + 1..].trim()),
            None => (None, item),
        };
        if alias.as_deref() == Some("") {
            return Err(RestError::validation("empty alias in select"));
        }

        match rest.find('(') {
            Some(open) => {
                let inner = rest[open + 1..].strip_suffix(')').ok_or_else(|| {
                    RestError::validation(format!("unbalanced parentheses in '{}'", item))
                })?;
                let head = &rest[..open];
                let (table, hint) = match head.split_once('!') {
                    Some((t, h)) => (t.trim(), Some(h.trim().to_string())),
                    None => (head.trim(), None),
                };
                if table.is_empty() || hint.as_deref() == Some("") {
                    return Err(RestError::validation(format!("invalid embed '{}'", item)));
                }
                let (select, nested) = if inner.trim().is_empty() {
                    (vec![ColumnSpec::Star], Vec::new())
                } else {
                    let (cols, nested) = parse_select(inner)?;
                    (cols, nested)
                };
                embeds.push(EmbedSpec {
                    table: table.to_string(),
                    alias,
                    hint,
                    select,
                    embeds: nested,
                });
            }
            None => {
                if rest.contains(')') || rest.contains('!') {
                    return Err(RestError::validation(format!("invalid column '{}'", item)));
                }
                columns.push(ColumnSpec::Column {
                    name: rest.to_string(),
                    alias,
                });
            }
        }
    }

    Ok((columns, embeds))
}

/// Split on top-level commas
fn split_respecting_parens(s: &str) -> RestResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| RestError::validation("unbalanced parentheses in select"))?;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }

    if depth != 0 {
        return Err(RestError::validation("unbalanced parentheses in select"));
    }
    parts.push(current);
    Ok(parts)
}

/// Parse `order`: `col[.asc|.desc][.nullsfirst|.nullslast]`, comma separated
pub fn parse_order(value: &str) -> RestResult<Vec<OrderSpec>> {
    let mut orders = Vec::new();

    for part in value.split(',') {
        let mut pieces = part.trim().split('.');
        let column = pieces.next().unwrap_or_default();
        if column.is_empty() {
            return Err(RestError::validation("empty column in order"));
        }

        let mut spec = OrderSpec::asc(column);
        let mut seen_direction = false;
        let mut seen_nulls = false;
        for modifier in pieces {
            match modifier {
                "asc" | "desc" if !seen_direction && !seen_nulls => {
                    seen_direction = true;
                    spec.direction = if modifier == "asc" {
                        Direction::Asc
                    } else {
                        Direction::Desc
                    };
                }
                "nullsfirst" | "nullslast" if !seen_nulls => {
                    seen_nulls = true;
                    spec.nulls = if modifier == "nullsfirst" {
                        NullsOrder::First
                    } else {
                        NullsOrder::Last
                    };
                }
                other => {
                    return Err(RestError::validation(format!(
                        "invalid order modifier '{}'",
                        other
                    )))
                }
            }
        }
        orders.push(spec);
    }

    Ok(orders)
}
