//! The total order on East values
//!
//! Every type induces a deterministic, total comparison on its
//! inhabitants, and the codec leans on it: dict and set iteration order,
//! and therefore wire byte order, is exactly this order. Composites
//! compare lexicographically (structs in declared field order, arrays
//! item by item, dicts and sets as sorted entry sequences); variants
//! compare first by declared tag order — every variant value carries its
//! tag's declared position — then by payload. All NaN floats form a
//! single equivalence class that orders after every finite float and
//! after +∞; -0.0 orders before 0.0 so that equal values always encode
//! to identical bytes.
//!
//! Values of different shapes compare by a fixed shape rank, which keeps
//! the order total even for heterogeneous comparisons that a well-typed
//! program never makes.

use crate::value::Value;
use std::cmp::Ordering;

/// IEEE floats under the East order: a single NaN class after +∞,
/// otherwise `total_cmp` (so -0.0 < 0.0).
pub fn float_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

fn shape_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Boolean(_) => 1,
        Value::Integer(_) => 2,
        Value::Float(_) => 3,
        Value::String(_) => 4,
        Value::DateTime(_) => 5,
        Value::Blob(_) => 6,
        Value::Ref(_) => 7,
        Value::Array(_) => 8,
        Value::Set(_) => 9,
        Value::Dict(_) => 10,
        Value::Struct(_) => 11,
        Value::Variant(_) => 12,
        Value::Type(_) => 13,
        Value::Function(_) => 14,
    }
}

/// The total order on values.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => float_cmp(*x, *y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        (Value::Ref(x), Value::Ref(y)) => total_cmp(&x.get(), &y.get()),
        (Value::Array(x), Value::Array(y)) => cmp_sequences(x.iter(), y.iter()),
        (Value::Set(x), Value::Set(y)) => cmp_sequences(x.iter(), y.iter()),
        (Value::Dict(x), Value::Dict(y)) => {
            let xs = x.iter().flat_map(|(k, v)| [k, v]);
            let ys = y.iter().flat_map(|(k, v)| [k, v]);
            cmp_sequences(xs, ys)
        }
        (Value::Struct(x), Value::Struct(y)) => {
            for ((xn, xv), (yn, yv)) in x.fields.iter().zip(y.fields.iter()) {
                match xn.cmp(yn).then_with(|| total_cmp(xv, yv)) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.fields.len().cmp(&y.fields.len())
        }
        (Value::Variant(x), Value::Variant(y)) => x
            .index
            .cmp(&y.index)
            .then_with(|| x.tag.cmp(&y.tag))
            .then_with(|| total_cmp(&x.payload, &y.payload)),
        (Value::Type(x), Value::Type(y)) => x.cmp(y),
        (Value::Function(x), Value::Function(y)) => x.cmp(y),
        _ => shape_rank(a).cmp(&shape_rank(b)),
    }
}

fn cmp_sequences<'a>(
    xs: impl Iterator<Item = &'a Value>,
    ys: impl Iterator<Item = &'a Value>,
) -> Ordering {
    let mut xs = xs;
    let mut ys = ys;
    loop {
        match (xs.next(), ys.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match total_cmp(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        total_cmp(self, other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(total_cmp(self, other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        total_cmp(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_nan_class_orders_last() {
        let nan = Value::Float(f64::NAN);
        let inf = Value::Float(f64::INFINITY);
        let one = Value::Float(1.0);
        assert_eq!(total_cmp(&inf, &nan), Ordering::Less);
        assert_eq!(total_cmp(&one, &nan), Ordering::Less);
        assert_eq!(total_cmp(&nan, &nan), Ordering::Equal);
        // Every NaN bit pattern lands in the same class.
        let other_nan = Value::Float(-f64::NAN);
        assert_eq!(total_cmp(&nan, &other_nan), Ordering::Equal);
    }

    #[test]
    fn test_negative_zero_below_positive_zero() {
        assert_eq!(
            total_cmp(&Value::Float(-0.0), &Value::Float(0.0)),
            Ordering::Less
        );
    }

    #[test]
    fn test_arrays_lexicographic() {
        let a = Value::array(vec![Value::integer(1), Value::integer(2)]);
        let b = Value::array(vec![Value::integer(1), Value::integer(3)]);
        let c = Value::array(vec![Value::integer(1)]);
        assert_eq!(total_cmp(&a, &b), Ordering::Less);
        assert_eq!(total_cmp(&c, &a), Ordering::Less);
        assert_eq!(total_cmp(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_structs_in_declared_field_order() {
        let a = Value::struct_of(vec![("x", Value::integer(1)), ("y", Value::integer(9))]);
        let b = Value::struct_of(vec![("x", Value::integer(2)), ("y", Value::integer(0))]);
        assert_eq!(total_cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_variants_by_declared_tag_order_then_payload() {
        // Declared order deliberately disagrees with name order.
        let ty = crate::types::Type::variant_of(vec![
            ("z", crate::types::Type::Integer),
            ("a", crate::types::Type::Integer),
        ]);
        let z = Value::variant(&ty, "z", Value::integer(9)).unwrap();
        let a = Value::variant(&ty, "a", Value::integer(0)).unwrap();
        assert_eq!(total_cmp(&z, &a), Ordering::Less);
        let z_bigger = Value::variant(&ty, "z", Value::integer(10)).unwrap();
        assert_eq!(total_cmp(&z, &z_bigger), Ordering::Less);
    }

    #[test]
    fn test_dict_insertion_order_invisible() {
        let a = Value::dict_of(vec![
            (Value::string("b"), Value::integer(2)),
            (Value::string("a"), Value::integer(1)),
        ]);
        let b = Value::dict_of(vec![
            (Value::string("a"), Value::integer(1)),
            (Value::string("b"), Value::integer(2)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_refs_compare_by_content() {
        let a = Value::ref_of(Value::integer(1));
        let b = Value::ref_of(Value::integer(1));
        assert_eq!(a, b);
        let c = Value::ref_of(Value::integer(2));
        assert_eq!(total_cmp(&a, &c), Ordering::Less);
    }

    #[test]
    fn test_order_is_transitive_across_sample() {
        // A small cross-shape sample; Ord must be total and transitive.
        let sample = vec![
            Value::Null,
            Value::Boolean(false),
            Value::Boolean(true),
            Value::integer(-1),
            Value::integer(10),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(2.5),
            Value::Float(f64::NAN),
            Value::string(""),
            Value::string("zebra"),
            Value::blob(vec![0, 1]),
            Value::array(vec![]),
            Value::set_of(vec![Value::integer(1)]),
        ];
        for a in &sample {
            for b in &sample {
                for c in &sample {
                    if total_cmp(a, b) != Ordering::Greater
                        && total_cmp(b, c) != Ordering::Greater
                    {
                        assert_ne!(
                            total_cmp(a, c),
                            Ordering::Greater,
                            "transitivity violated: {} <= {} <= {} but {} > {}",
                            a,
                            b,
                            c,
                            a,
                            c
                        );
                    }
                    // Antisymmetry.
                    assert_eq!(total_cmp(a, b), total_cmp(b, a).reverse());
                }
            }
        }
    }
}
