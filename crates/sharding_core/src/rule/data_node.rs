use std::fmt;

use serde::{Deserialize, Serialize};
use sharding_error::{Result, ShardingError};

/// A single (data source, actual table) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        DataNode {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parse a node from `data_source.table`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(DataNode::new(ds, table))
            }
            _ => Err(ShardingError::config("Invalid format for actual data node").with_field("node", s.to_string())),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// Expand an inline expression into its values.
///
/// Supports literals, `${a..b}` inclusive integer ranges and `${[x, y]}` (or
/// `${x, y}`) lists. Multiple placeholders in one segment produce the
/// cartesian product, in left to right order. Top level commas separate
/// independent segments.
///
/// `ds_${0..1}.t_${0..1}` expands to `ds_0.t_0, ds_0.t_1, ds_1.t_0,
/// ds_1.t_1`.
pub fn expand_inline_expression(expr: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for segment in split_top_level(expr)? {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        out.extend(expand_segment(segment)?);
    }
    Ok(out)
}

fn split_top_level(expr: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in expr.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| unbalanced(expr))?;
            }
            ',' if depth == 0 => {
                segments.push(&expr[start..idx]);
                start = idx + 1;
            }
            _ => (),
        }
    }
    if depth != 0 {
        return Err(unbalanced(expr));
    }
    segments.push(&expr[start..]);
    Ok(segments)
}

fn unbalanced(expr: &str) -> ShardingError {
    ShardingError::config("Unbalanced braces in inline expression").with_field("expression", expr.to_string())
}

fn expand_segment(segment: &str) -> Result<Vec<String>> {
    let mut results = vec![String::new()];
    let mut rest = segment;

    while let Some(open) = rest.find("${") {
        let literal = &rest[..open];
        let close = rest[open..]
            .find('}')
            .map(|idx| idx + open)
            .ok_or_else(|| unbalanced(segment))?;
        let body = &rest[open + 2..close];
        let choices = expand_placeholder(body, segment)?;

        let mut next = Vec::with_capacity(results.len() * choices.len());
        for prefix in &results {
            for choice in &choices {
                next.push(format!("{prefix}{literal}{choice}"));
            }
        }
        results = next;
        rest = &rest[close + 1..];
    }

    for result in &mut results {
        result.push_str(rest);
    }
    Ok(results)
}

fn expand_placeholder(body: &str, segment: &str) -> Result<Vec<String>> {
    let body = body.trim();
    if let Some((lower, upper)) = body.split_once("..") {
        let lower: i64 = lower.trim().parse()?;
        let upper: i64 = upper.trim().parse()?;
        if lower > upper {
            return Err(ShardingError::config("Inline range lower bound is greater than upper bound")
                .with_field("expression", segment.to_string()));
        }
        return Ok((lower..=upper).map(|v| v.to_string()).collect());
    }

    let body = body.strip_prefix('[').unwrap_or(body);
    let body = body.strip_suffix(']').unwrap_or(body);
    let values: Vec<String> = body
        .split(',')
        .map(|v| v.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(ShardingError::config("Empty inline expression placeholder")
            .with_field("expression", segment.to_string()));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_data_node() {
        assert_eq!(DataNode::new("ds_0", "t_order_1"), DataNode::parse("ds_0.t_order_1").unwrap());
        assert!(DataNode::parse("t_order").is_err());
        assert!(DataNode::parse("ds.a.b").is_err());
    }

    #[test]
    fn expand_cartesian() {
        let nodes = expand_inline_expression("ds_${0..1}.t_order_${0..1}").unwrap();
        assert_eq!(vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"], nodes);
    }

    #[test]
    fn expand_list_and_segments() {
        let nodes = expand_inline_expression("ds_${['a', 'b']}.t_user, ds_c.t_user").unwrap();
        assert_eq!(vec!["ds_a.t_user", "ds_b.t_user", "ds_c.t_user"], nodes);
    }

    #[test]
    fn expand_literal_only() {
        assert_eq!(vec!["ds.t_config"], expand_inline_expression("ds.t_config").unwrap());
    }

    #[test]
    fn expand_invalid() {
        assert!(expand_inline_expression("ds_${0..1.t_order").is_err());
        assert!(expand_inline_expression("ds_${3..1}.t").is_err());
    }
}
