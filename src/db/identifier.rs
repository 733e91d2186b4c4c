//! SQL identifier handling.
//!
//! Every database, table and column name that ends up in generated SQL goes
//! through this module. Names that come from configuration (server ids and
//! source database names) must pass a strict allow-list because they are
//! combined into new ODS database names. Names reported by a source server
//! (tables, columns) are accepted as-is and backtick-quoted.

use crate::error::{ReplicationError, ReplicationResult};

/// MySQL limit for database, table and column names.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Check a configuration-derived name against the allow-list: 1-64 ASCII
/// letters, digits, `_` or `$`.
pub fn validate_name(name: &str) -> ReplicationResult<()> {
    if name.is_empty() {
        return Err(ReplicationError::invalid_identifier(name, "name is empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(ReplicationError::invalid_identifier(
            name,
            format!("name exceeds {MAX_IDENTIFIER_LEN} characters"),
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
    {
        return Err(ReplicationError::invalid_identifier(
            name,
            format!("character {bad:?} is not allowed (use letters, digits, '_' or '$')"),
        ));
    }
    Ok(())
}

/// Quote a name for MySQL, doubling embedded backticks.
pub fn quote(name: &str) -> ReplicationResult<String> {
    if name.is_empty() {
        return Err(ReplicationError::invalid_identifier(name, "name is empty"));
    }
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ReplicationError::invalid_identifier(
            name,
            format!("name exceeds {MAX_IDENTIFIER_LEN} characters"),
        ));
    }
    if name.contains('\0') {
        return Err(ReplicationError::invalid_identifier(
            name,
            "name contains a NUL byte",
        ));
    }
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote `database`.`table`.
pub fn qualified(database: &str, table: &str) -> ReplicationResult<String> {
    Ok(format!("{}.{}", quote(database)?, quote(table)?))
}

/// Column type strings are copied verbatim into `CREATE TABLE`; reject
/// anything outside a quoted literal that could end the statement or open a
/// comment. ENUM and SET members are free to contain those characters.
pub fn check_column_type(column: &str, column_type: &str) -> ReplicationResult<()> {
    let trimmed = column_type.trim();
    if trimmed.is_empty() {
        return Err(ReplicationError::invalid_identifier(
            column,
            "column type is empty",
        ));
    }
    if trimmed.contains('\0') {
        return Err(ReplicationError::invalid_identifier(
            column,
            "column type contains a NUL byte",
        ));
    }

    let reject = |what: &str| {
        Err(ReplicationError::invalid_identifier(
            column,
            format!("column type {trimmed:?} contains {what} outside a quoted literal"),
        ))
    };

    let mut chars = trimmed.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        if in_literal {
            match c {
                '\\' => {
                    chars.next();
                }
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                }
                '\'' => in_literal = false,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' => in_literal = true,
            ';' => return reject("';'"),
            '#' => return reject("'#'"),
            '-' if chars.peek() == Some(&'-') => return reject("'--'"),
            '/' if chars.peek() == Some(&'*') => return reject("'/*'"),
            _ => {}
        }
    }
    if in_literal {
        return reject("an unterminated literal");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_accepts_plain_names() {
        assert!(validate_name("shop").is_ok());
        assert!(validate_name("s1_shop").is_ok());
        assert!(validate_name("Sales$2024").is_ok());
    }

    #[test]
    fn test_validate_name_rejects_injection() {
        for name in [
            "",
            "shop; DROP DATABASE x",
            "a b",
            "shop`",
            "db-name",
            "naïve",
            "x.y",
        ] {
            assert!(validate_name(name).is_err(), "should reject {name:?}");
        }
    }

    #[test]
    fn test_validate_name_length_limit() {
        assert!(validate_name(&"a".repeat(64)).is_ok());
        let err = validate_name(&"a".repeat(65)).unwrap_err();
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn test_quote_doubles_backticks() {
        assert_eq!(quote("orders").unwrap(), "`orders`");
        assert_eq!(quote("we`ird").unwrap(), "`we``ird`");
        assert_eq!(quote("has space").unwrap(), "`has space`");
    }

    #[test]
    fn test_quote_rejects_empty_and_nul() {
        assert!(quote("").is_err());
        assert!(quote("a\0b").is_err());
        assert!(quote(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_qualified() {
        assert_eq!(qualified("s1_shop", "orders").unwrap(), "`s1_shop`.`orders`");
    }

    #[test]
    fn test_check_column_type() {
        assert!(check_column_type("id", "int(11) unsigned").is_ok());
        assert!(check_column_type("total", "decimal(10,2)").is_ok());
        assert!(check_column_type("state", "enum('a','b')").is_ok());
        assert!(check_column_type("x", "int; DROP TABLE y").is_err());
        assert!(check_column_type("x", "int -- comment").is_err());
        assert!(check_column_type("x", "int /* c */").is_err());
        assert!(check_column_type("x", "  ").is_err());
        assert!(check_column_type("x", "enum('a").is_err());
    }

    #[test]
    fn test_check_column_type_allows_specials_inside_literals() {
        assert!(check_column_type("tag", "enum('#1','a;b','c--d')").is_ok());
        assert!(check_column_type("q", "set('it''s','x/*y')").is_ok());
    }
}
