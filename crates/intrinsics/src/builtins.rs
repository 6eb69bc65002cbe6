//! Default native implementations.
//!
//! Values are immutable: every capability that "modifies" a list or catalog
//! returns a new value.

use linkme::distributed_slice;
use tessera_foundation::{Catalog, TypeTag, Value};

use crate::{IntrinsicDescriptor, IntrinsicError, INTRINSICS};

macro_rules! intrinsic {
    ($static_name:ident, $name:literal, $receiver:expr, $arity:literal, $doc:literal, $imp:expr) => {
        #[distributed_slice(INTRINSICS)]
        static $static_name: IntrinsicDescriptor = IntrinsicDescriptor {
            name: $name,
            receiver: $receiver,
            arity: $arity,
            doc: $doc,
            implementation: $imp,
        };
    };
}

fn invalid(name: &'static str, reason: impl Into<String>) -> IntrinsicError {
    IntrinsicError::InvalidArgument {
        name,
        reason: reason.into(),
    }
}

fn number(name: &'static str, value: &Value) -> Result<f64, IntrinsicError> {
    value
        .as_number()
        .ok_or_else(|| invalid(name, format!("expected a number, found {}", value.tag())))
}

fn boolean(name: &'static str, value: &Value) -> Result<bool, IntrinsicError> {
    value
        .as_bool()
        .ok_or_else(|| invalid(name, format!("expected a boolean, found {}", value.tag())))
}

fn key(name: &'static str, value: &Value) -> Result<tessera_foundation::Symbol, IntrinsicError> {
    value
        .as_symbol()
        .cloned()
        .ok_or_else(|| invalid(name, format!("expected a symbol key, found {}", value.tag())))
}

/// Whether `value` matches `pattern`.
///
/// `none` matches anything. A catalog pattern matches a catalog holding at
/// least the pattern's keys with matching values. A list pattern matches a
/// list of the same length element by element. Everything else compares by
/// equality.
pub(crate) fn does_match(value: &Value, pattern: &Value) -> bool {
    match (value, pattern) {
        (_, Value::None) => true,
        (Value::Catalog(actual), Value::Catalog(expected)) => expected.iter().all(|(k, p)| {
            actual
                .get(k)
                .is_some_and(|v| does_match(v, p))
        }),
        (Value::List(actual), Value::List(expected)) => {
            actual.len() == expected.len()
                && actual.iter().zip(expected).all(|(v, p)| does_match(v, p))
        }
        _ => value == pattern,
    }
}

// collections

intrinsic!(LIST, "$list", None, 0, "Create an empty list", |_| Ok(Value::List(Vec::new())));

intrinsic!(CATALOG, "$catalog", None, 0, "Create an empty catalog", |_| {
    Ok(Value::Catalog(Catalog::new()))
});

intrinsic!(ADD_ITEM, "$addItem", Some(TypeTag::List), 2, "Append an item to a list", |args| {
    let mut items = args[0].as_list().unwrap_or_default().to_vec();
    items.push(args[1].clone());
    Ok(Value::List(items))
});

intrinsic!(GET_ITEM, "$getItem", Some(TypeTag::List), 2, "Item at a 1-based index", |args| {
    let items = args[0].as_list().unwrap_or_default();
    let index = number("$getItem", &args[1])?;
    if index.fract() != 0.0 || index < 1.0 || index > items.len() as f64 {
        return Err(invalid("$getItem", format!("index {} out of range 1..={}", index, items.len())));
    }
    Ok(items[index as usize - 1].clone())
});

intrinsic!(GET_VALUE, "$getValue", Some(TypeTag::Catalog), 2, "Value for a key, or none", |args| {
    let key = key("$getValue", &args[1])?;
    Ok(args[0].get(&key).cloned().unwrap_or_default())
});

intrinsic!(SET_VALUE, "$setValue", Some(TypeTag::Catalog), 3, "Catalog with a key set", |args| {
    let key = key("$setValue", &args[1])?;
    let mut catalog = args[0].as_catalog().cloned().unwrap_or_default();
    catalog.insert(key, args[2].clone());
    Ok(Value::Catalog(catalog))
});

intrinsic!(SIZE_LIST, "$size", Some(TypeTag::List), 1, "Number of items", |args| {
    Ok(Value::Number(args[0].as_list().map_or(0, <[Value]>::len) as f64))
});

intrinsic!(SIZE_CATALOG, "$size", Some(TypeTag::Catalog), 1, "Number of entries", |args| {
    Ok(Value::Number(args[0].as_catalog().map_or(0, Catalog::len) as f64))
});

intrinsic!(SIZE_TEXT, "$size", Some(TypeTag::Text), 1, "Number of characters", |args| {
    Ok(Value::Number(args[0].as_text().map_or(0, |s| s.chars().count()) as f64))
});

intrinsic!(IS_EMPTY_LIST, "$isEmpty", Some(TypeTag::List), 1, "Whether the list is empty", |args| {
    Ok(Value::Boolean(args[0].as_list().map_or(true, <[Value]>::is_empty)))
});

intrinsic!(IS_EMPTY_CATALOG, "$isEmpty", Some(TypeTag::Catalog), 1, "Whether the catalog is empty", |args| {
    Ok(Value::Boolean(args[0].as_catalog().map_or(true, Catalog::is_empty)))
});

intrinsic!(IS_EMPTY_TEXT, "$isEmpty", Some(TypeTag::Text), 1, "Whether the text is empty", |args| {
    Ok(Value::Boolean(args[0].as_text().map_or(true, str::is_empty)))
});

intrinsic!(CONCAT_TEXT, "$concatenation", Some(TypeTag::Text), 2, "Join two texts", |args| {
    let tail = args[1]
        .as_text()
        .ok_or_else(|| invalid("$concatenation", "cannot join text with a non-text value"))?;
    Ok(Value::Text(format!("{}{}", args[0].as_text().unwrap_or_default(), tail)))
});

intrinsic!(CONCAT_LIST, "$concatenation", Some(TypeTag::List), 2, "Join two lists", |args| {
    let tail = args[1]
        .as_list()
        .ok_or_else(|| invalid("$concatenation", "cannot join a list with a non-list value"))?;
    let mut items = args[0].as_list().unwrap_or_default().to_vec();
    items.extend_from_slice(tail);
    Ok(Value::List(items))
});

// comparison

intrinsic!(IS_EQUAL, "$isEqual", None, 2, "Structural equality", |args| {
    Ok(Value::Boolean(args[0] == args[1]))
});

intrinsic!(DOES_MATCH, "$doesMatch", None, 2, "Pattern match against a value", |args| {
    Ok(Value::Boolean(does_match(&args[0], &args[1])))
});

// logic

intrinsic!(NOT, "$not", Some(TypeTag::Boolean), 1, "Logical negation", |args| {
    Ok(Value::Boolean(!boolean("$not", &args[0])?))
});

intrinsic!(AND, "$and", Some(TypeTag::Boolean), 2, "Logical conjunction", |args| {
    Ok(Value::Boolean(boolean("$and", &args[0])? && boolean("$and", &args[1])?))
});

intrinsic!(OR, "$or", Some(TypeTag::Boolean), 2, "Logical disjunction", |args| {
    Ok(Value::Boolean(boolean("$or", &args[0])? || boolean("$or", &args[1])?))
});

// arithmetic

intrinsic!(NEGATIVE, "$negative", Some(TypeTag::Number), 1, "Arithmetic negation", |args| {
    Ok(Value::Number(-number("$negative", &args[0])?))
});

intrinsic!(SUM, "$sum", Some(TypeTag::Number), 2, "Addition", |args| {
    Ok(Value::Number(number("$sum", &args[0])? + number("$sum", &args[1])?))
});

intrinsic!(DIFFERENCE, "$difference", Some(TypeTag::Number), 2, "Subtraction", |args| {
    Ok(Value::Number(number("$difference", &args[0])? - number("$difference", &args[1])?))
});

intrinsic!(PRODUCT, "$product", Some(TypeTag::Number), 2, "Multiplication", |args| {
    Ok(Value::Number(number("$product", &args[0])? * number("$product", &args[1])?))
});
