//! CQL keyword classification.
//!
//! Two fixed sets: reserved words must be double-quoted when used as
//! identifiers, non-reserved words are valid identifiers and must not be
//! quoted. Comparisons are case-insensitive. Both lists are sorted so
//! membership is a binary search.

/// Words CQL reserves; using one as an identifier requires double quotes.
pub const RESERVED: &[&str] = &[
    "ADD",
    "ALLOW",
    "ALTER",
    "AND",
    "APPLY",
    "ASC",
    "AUTHORIZE",
    "BATCH",
    "BEGIN",
    "BY",
    "COLUMNFAMILY",
    "CREATE",
    "DELETE",
    "DESC",
    "DESCRIBE",
    "DROP",
    "ENTRIES",
    "EXECUTE",
    "FROM",
    "FULL",
    "GRANT",
    "IF",
    "IN",
    "INDEX",
    "INFINITY",
    "INSERT",
    "INTO",
    "IS",
    "KEYSPACE",
    "LIMIT",
    "MATERIALIZED",
    "MODIFY",
    "NAN",
    "NORECURSIVE",
    "NOT",
    "NULL",
    "OF",
    "ON",
    "OR",
    "ORDER",
    "PRIMARY",
    "RENAME",
    "REPLACE",
    "REVOKE",
    "SCHEMA",
    "SELECT",
    "SET",
    "TABLE",
    "TO",
    "TOKEN",
    "TRUNCATE",
    "UNLOGGED",
    "UPDATE",
    "USE",
    "USING",
    "VIEW",
    "WHERE",
    "WITH",
];

/// Words that look like keywords but remain valid unquoted identifiers.
pub const NON_RESERVED: &[&str] = &[
    "AGGREGATE",
    "ALL",
    "AS",
    "CALLED",
    "CLUSTERING",
    "COMPACT",
    "CONTAINS",
    "COUNT",
    "COUNTER",
    "CUSTOM",
    "DISTINCT",
    "EXISTS",
    "FILTERING",
    "FINALFUNC",
    "FROZEN",
    "FUNCTION",
    "FUNCTIONS",
    "INITCOND",
    "INPUT",
    "JSON",
    "KEY",
    "KEYS",
    "KEYSPACES",
    "LANGUAGE",
    "LIST",
    "LOGIN",
    "MAP",
    "NOLOGIN",
    "NOSUPERUSER",
    "OPTIONS",
    "PASSWORD",
    "PERMISSION",
    "PERMISSIONS",
    "RETURNS",
    "ROLE",
    "ROLES",
    "SFUNC",
    "STATIC",
    "STORAGE",
    "STYPE",
    "SUPERUSER",
    "TRIGGER",
    "TTL",
    "TUPLE",
    "TYPE",
    "USER",
    "USERS",
    "VALUES",
    "WRITETIME",
];

/// Whether `word` is reserved (case-insensitive).
pub fn is_reserved(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    RESERVED.binary_search(&upper.as_str()).is_ok()
}

/// Whether `word` appears in either keyword list (case-insensitive).
pub fn is_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    RESERVED.binary_search(&upper.as_str()).is_ok() || NON_RESERVED.binary_search(&upper.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_sorted_for_binary_search() {
        let mut sorted = RESERVED.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED);
        let mut sorted = NON_RESERVED.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, NON_RESERVED);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert!(is_reserved("select"));
        assert!(is_reserved("Where"));
        assert!(is_reserved("BATCH"));
        assert!(!is_reserved("ttl"));
        assert!(!is_reserved("writetime"));
        assert!(is_keyword("ttl"));
        assert!(!is_keyword("user_id"));
    }

    #[test]
    fn the_two_sets_are_disjoint() {
        for word in NON_RESERVED {
            assert!(!is_reserved(word), "{word} is in both keyword lists");
        }
    }
}
