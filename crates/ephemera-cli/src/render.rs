// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plain-text rendering of command outcomes.

use ephemera_lease::Dispatched;

const SEPARATOR: &str = " | ";

/// Lines to print for one dispatched command.
pub fn render_outcome(outcome: &Dispatched) -> Vec<String> {
	match outcome {
		Dispatched::Rows { columns, rows } => render_rows(columns, rows),
		Dispatched::Committed { count } => vec![
			format!("OK: {count} {} affected", plural_rows(*count)),
			"committed".to_string(),
		],
		Dispatched::RolledBack(err) => vec![format!("Error: {err}"), "rolled back".to_string()],
	}
}

/// Header, a dashed rule as wide as the header, then one line per row.
pub fn render_rows(columns: &[String], rows: &[Vec<String>]) -> Vec<String> {
	if rows.is_empty() {
		return vec!["0 rows returned".to_string()];
	}

	let header = columns.join(SEPARATOR);
	let rule = "-".repeat(header.chars().count());
	let mut lines = Vec::with_capacity(rows.len() + 2);
	lines.push(header);
	lines.push(rule);
	lines.extend(rows.iter().map(|row| row.join(SEPARATOR)));
	lines
}

fn plural_rows(count: u64) -> &'static str {
	if count == 1 {
		"row"
	} else {
		"rows"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ephemera_common_core::CommandError;
	use proptest::prelude::*;

	fn strings(items: &[&str]) -> Vec<String> {
		items.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn rows_render_as_table() {
		let lines = render_rows(
			&strings(&["id", "name"]),
			&[strings(&["1", "alice"]), strings(&["2", "NULL"])],
		);
		assert_eq!(
			lines,
			strings(&["id | name", "---------", "1 | alice", "2 | NULL"])
		);
	}

	#[test]
	fn empty_result_set() {
		assert_eq!(
			render_rows(&strings(&["id"]), &[]),
			strings(&["0 rows returned"])
		);
	}

	#[test]
	fn committed_and_rolled_back() {
		assert_eq!(
			render_outcome(&Dispatched::Committed { count: 1 }),
			strings(&["OK: 1 row affected", "committed"])
		);
		assert_eq!(
			render_outcome(&Dispatched::Committed { count: 3 })[0],
			"OK: 3 rows affected"
		);
		let lines = render_outcome(&Dispatched::RolledBack(CommandError::Execution(
			"Table 'shop.nope' doesn't exist".into(),
		)));
		assert!(lines[0].starts_with("Error: command failed"));
		assert_eq!(lines[1], "rolled back");
	}

	proptest! {
		#[test]
		fn rule_matches_header_width(columns in prop::collection::vec("[a-z_]{1,12}", 1..6)) {
			let rows = vec![columns.clone()];
			let lines = render_rows(&columns, &rows);
			prop_assert_eq!(lines[1].chars().count(), lines[0].chars().count());
			prop_assert_eq!(lines.len(), 3);
		}
	}
}
