//! Keyword vocabulary for identifier classification.
//!
//! Superset of reserved words and common built-in function names across the
//! supported dialects. A word in this set is never reported as a column.

use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    static ref SQL_KEYWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            // clauses and operators
            "SELECT", "FROM", "WHERE", "GROUP", "BY", "ORDER", "LIMIT", "OFFSET", "AS",
            "DESC", "ASC", "AND", "OR", "NOT", "IN", "ON", "USING", "JOIN", "LEFT",
            "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL", "SEMI", "ANTI", "GLOBAL",
            "UNION", "INTERSECT", "EXCEPT", "ALL", "DISTINCT", "CASE", "WHEN", "THEN",
            "ELSE", "END", "IS", "NULL", "TRUE", "FALSE", "BETWEEN", "LIKE", "ILIKE",
            "HAVING", "EXISTS", "WITH", "RECURSIVE", "INTERVAL", "OVER", "PARTITION",
            "WINDOW", "ROWS", "RANGE", "PRECEDING", "FOLLOWING", "UNBOUNDED", "CURRENT",
            "ROW", "FILTER", "WITHIN", "NULLS", "FIRST", "LAST", "TOP", "FETCH", "NEXT",
            "ONLY", "FORMAT", "SETTINGS", "FINAL", "PREWHERE", "SAMPLE", "TIES", "ESCAPE",
            "COLLATE", "ARRAY", "ANY", "SOME",
            // statements
            "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE", "DROP", "TABLE",
            "CREATE", "ALTER", "TRUNCATE", "IF", "REPLACE", "VIEW", "INDEX", "PRIMARY",
            "KEY", "ENGINE", "DEFAULT", "SHOW", "DESCRIBE", "EXPLAIN",
            // aggregates
            "COUNT", "SUM", "AVG", "MIN", "MAX", "COUNTIF", "SUMIF", "AVGIF", "UNIQ",
            "UNIQEXACT", "GROUPARRAY", "ARGMAX", "ARGMIN", "QUANTILE", "MEDIAN",
            "STDDEV", "VARIANCE", "GROUP_CONCAT", "STRING_AGG", "ARRAY_AGG",
            "ROW_NUMBER", "RANK", "DENSE_RANK", "LAG", "LEAD",
            // date parts and date/time functions
            "YEAR", "QUARTER", "MONTH", "WEEK", "DAY", "HOUR", "MINUTE", "SECOND",
            "DATE", "TIME", "TIMESTAMP", "EPOCH", "DOW", "DOY", "NOW", "TODAY",
            "YESTERDAY", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURDATE",
            "CURTIME", "EXTRACT", "DATE_TRUNC", "DATE_PART", "DATE_SUB", "DATE_ADD",
            "DATE_FORMAT", "DATEDIFF", "WEEKDAY", "MAKEDATE", "AGE", "TO_CHAR",
            "TOYEAR", "TOMONTH", "TOQUARTER", "TODAYOFMONTH", "TODAYOFWEEK", "TOHOUR",
            "TOSTARTOFDAY", "TOSTARTOFWEEK", "TOMONDAY", "TOSTARTOFMONTH",
            "TOSTARTOFQUARTER", "TOSTARTOFYEAR", "TODATE", "TODATETIME", "TOYYYYMM",
            "TOYYYYMMDD", "FORMATDATETIME", "ADDDAYS", "ADDMONTHS", "SUBTRACTDAYS",
            "SUBTRACTMONTHS", "DATEADD", "DATESUB",
            // string functions
            "CONCAT", "SUBSTRING", "SUBSTR", "UPPER", "LOWER", "TRIM", "LTRIM", "RTRIM",
            "LENGTH", "POSITION", "SPLIT_PART", "TOSTRING", "LEFTPAD", "RIGHTPAD",
            // null handling and conversion
            "COALESCE", "IFNULL", "NULLIF", "ISNULL", "IFF", "CAST", "CONVERT",
            // math
            "ROUND", "FLOOR", "CEIL", "CEILING", "ABS", "MOD", "SQRT", "POWER", "POW",
            "EXP", "LN", "LOG", "GREATEST", "LEAST",
        ];
        words.iter().copied().collect()
    };

    /// Keywords that open a clause; used when scanning backward for context.
    static ref CLAUSE_KEYWORDS: HashSet<&'static str> = [
        "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "JOIN", "ON", "LIMIT",
    ]
    .iter()
    .copied()
    .collect();
}

/// True if the word (any case) is in the keyword vocabulary.
pub fn is_keyword(word: &str) -> bool {
    SQL_KEYWORDS.contains(word.to_uppercase().as_str())
}

pub fn is_clause_keyword(word: &str) -> bool {
    CLAUSE_KEYWORDS.contains(word.to_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert!(is_keyword("select"));
        assert!(is_keyword("toStartOfWeek"));
        assert!(!is_keyword("company_name"));
        assert!(!is_keyword("id"));
        assert!(!is_keyword("name"));
    }
}
