use std::fmt;

use super::{
	error::{Error, Result},
	lexer::Position,
	shader::{Property, PropertyType, UiAttribute, Value},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// A numeric literal, remembering whether it was written as a float.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Number {
	pub value: f64,
	pub is_float: bool,
}

impl Number {
	/// Parses a number lexeme. A decimal point, an exponent or an `f` suffix makes it a float.
	pub fn parse(lexeme: &str) -> Option<Self> {
		let digits = lexeme.trim_end_matches(['f', 'F']);
		let is_float = digits.len() != lexeme.len() || digits.contains(['.', 'e', 'E']);

		digits.parse::<f64>().ok().map(|value| Self { value, is_float })
	}

	pub fn int(value: i32) -> Self {
		Self {
			value: value as f64,
			is_float: false,
		}
	}

	pub fn float(value: f64) -> Self {
		Self { value, is_float: true }
	}
}

impl fmt::Display for Number {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_float && self.value.fract() == 0.0 {
			write!(f, "{:.1}", self.value)
		} else {
			write!(f, "{}", self.value)
		}
	}
}

/// A literal as written in the source, before it is given a type.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
	Number(Number),
	String(String),
	/// `(a, b, c)` in the Scribble DSL, `{a, b, c}` in OGSFX.
	Tuple(Vec<Number>),
	Bool(bool),
	/// `sampler_state { Texture = <name>; }`, holding the texture's name.
	Sampler(String),
}

impl Literal {
	/// How the literal reads in a type error.
	pub fn shape(&self) -> String {
		match self {
			Literal::Number(number) if number.is_float => "a float".to_owned(),
			Literal::Number(_) => "an integer".to_owned(),
			Literal::String(_) => "a string".to_owned(),
			Literal::Tuple(components) => format!("a {}-component tuple", components.len()),
			Literal::Bool(_) => "a boolean".to_owned(),
			Literal::Sampler(_) => "a sampler state".to_owned(),
		}
	}

	pub fn as_number(&self) -> Option<f64> {
		match self {
			Literal::Number(number) => Some(number.value),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Literal::String(text) => Some(text),
			_ => None,
		}
	}
}

impl fmt::Display for Literal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Literal::Number(number) => write!(f, "{}", number),
			Literal::String(text) => write!(f, "{:?}", text),
			Literal::Tuple(components) => {
				let components: Vec<_> = components.iter().map(Number::to_string).collect();
				write!(f, "({})", components.join(", "))
			}
			Literal::Bool(value) => write!(f, "{}", value),
			Literal::Sampler(texture) => write!(f, "sampler_state {{ Texture = <{}>; }}", texture),
		}
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// A property declaration straight out of the parser, its type possibly still unknown.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDecl {
	pub name: String,
	pub label: String,
	pub declared: Option<PropertyType>,
	pub default: Option<Literal>,
	pub attributes: Vec<UiAttribute>,
	pub position: Position,
}

/// Gives a declaration its final type and converts its default to a typed value.
///
/// An explicit type always wins and the default has to fit it exactly. Without one the type is
/// inferred from the shape of the default: an integer or float, or a 2, 3 or 4 component tuple.
/// Four components infer `vec4`; `color` is only ever declared.
pub fn resolve(decl: PropertyDecl) -> Result<Property> {
	let ty = match decl.declared {
		Some(ty) => ty,
		None => match &decl.default {
			Some(literal) => infer(literal).ok_or_else(|| Error::AmbiguousDefault {
				name: decl.name.clone(),
				position: decl.position.clone(),
			})?,
			None => {
				return Err(Error::AmbiguousDefault {
					name: decl.name,
					position: decl.position,
				})
			}
		},
	};

	let default = match &decl.default {
		Some(literal) => Some(coerce(ty, literal).ok_or_else(|| Error::TypeMismatch {
			name: decl.name.clone(),
			expected: ty,
			found: literal.shape(),
			position: decl.position.clone(),
		})?),
		None => None,
	};

	Ok(Property {
		name: decl.name,
		label: decl.label,
		ty,
		default,
		attributes: decl.attributes,
		position: decl.position,
	})
}

/// The type a literal implies on its own, if it implies exactly one.
pub fn infer(literal: &Literal) -> Option<PropertyType> {
	match literal {
		Literal::Number(number) if number.is_float => Some(PropertyType::Float),
		Literal::Number(_) => Some(PropertyType::Int),
		Literal::Tuple(components) => match components.len() {
			2 => Some(PropertyType::Vec2),
			3 => Some(PropertyType::Vec3),
			4 => Some(PropertyType::Vec4),
			_ => None,
		},
		Literal::String(_) | Literal::Bool(_) | Literal::Sampler(_) => None,
	}
}

/// Converts a literal to a value of type `ty`, or `None` if its shape does not fit.
pub fn coerce(ty: PropertyType, literal: &Literal) -> Option<Value> {
	match (ty, literal) {
		(PropertyType::Float, Literal::Number(number)) => Some(Value::Float(number.value as f32)),
		(PropertyType::Int, Literal::Number(number)) if !number.is_float => int_of(number).map(Value::Int),
		(PropertyType::Int, Literal::Bool(value)) => Some(Value::Int(i32::from(*value))),
		(PropertyType::Vec2, Literal::Tuple(components)) => components_of(ty, components).map(Value::Vec2),
		(PropertyType::Vec3, Literal::Tuple(components)) => components_of(ty, components).map(Value::Vec3),
		(PropertyType::Vec4, Literal::Tuple(components)) => components_of(ty, components).map(Value::Vec4),
		(PropertyType::Color, Literal::Tuple(components)) => components_of(ty, components).map(Value::Color),
		(PropertyType::Texture2D, Literal::String(name) | Literal::Sampler(name)) => Some(Value::Texture2D(name.clone())),
		_ => None,
	}
}

fn int_of(number: &Number) -> Option<i32> {
	let range = f64::from(i32::MIN)..=f64::from(i32::MAX);
	range.contains(&number.value).then_some(number.value as i32)
}

fn components_of<const N: usize>(ty: PropertyType, components: &[Number]) -> Option<[f32; N]> {
	(ty.arity() == Some(components.len())).then(|| std::array::from_fn(|index| components[index].value as f32))
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use typed_path::Utf8UnixPathBuf;

	use super::*;

	fn decl(name: &str, declared: Option<PropertyType>, default: Option<Literal>) -> PropertyDecl {
		PropertyDecl {
			name: name.to_owned(),
			label: "x".to_owned(),
			declared,
			default,
			attributes: Vec::new(),
			position: Position::start_of(Arc::new(Utf8UnixPathBuf::from("/props.glsl"))),
		}
	}

	fn tuple(values: &[f64]) -> Literal {
		Literal::Tuple(values.iter().map(|value| Number::float(*value)).collect())
	}

	#[test]
	fn number_lexemes() {
		assert_eq!(Number::parse("1"), Some(Number::int(1)));
		assert_eq!(Number::parse("-2"), Some(Number::int(-2)));
		assert_eq!(Number::parse("0.5"), Some(Number::float(0.5)));
		assert_eq!(Number::parse("1.0f"), Some(Number::float(1.0)));
		assert_eq!(Number::parse("3e2"), Some(Number::float(300.0)));
		assert_eq!(Number::parse("nope"), None);
	}

	#[test]
	fn explicit_vec3() {
		let property = resolve(decl("_v3", Some(PropertyType::Vec3), Some(tuple(&[0.1, 0.2, 0.3])))).unwrap();
		assert_eq!(property.ty, PropertyType::Vec3);
		assert_eq!(property.default, Some(Value::Vec3([0.1, 0.2, 0.3])));
	}

	#[test]
	fn untyped_four_components_infer_vec4() {
		let property = resolve(decl("_auto_v4", None, Some(tuple(&[0.1, 0.2, 0.3, 0.4])))).unwrap();
		assert_eq!(property.ty, PropertyType::Vec4);
		assert_eq!(property.default, Some(Value::Vec4([0.1, 0.2, 0.3, 0.4])));
	}

	#[test]
	fn color_needs_explicit_hint() {
		let property = resolve(decl("_color", Some(PropertyType::Color), Some(tuple(&[0.1, 0.2, 0.3, 0.4])))).unwrap();
		assert_eq!(property.ty, PropertyType::Color);
		assert_eq!(property.default, Some(Value::Color([0.1, 0.2, 0.3, 0.4])));
	}

	#[test]
	fn int_and_float_by_decimal_point() {
		let int = resolve(decl("_i", None, Some(Literal::Number(Number::int(3))))).unwrap();
		let float = resolve(decl("_f", None, Some(Literal::Number(Number::float(3.0))))).unwrap();

		assert_eq!(int.default, Some(Value::Int(3)));
		assert_eq!(float.default, Some(Value::Float(3.0)));
	}

	#[test]
	fn int_defaults_must_fit_32_bits() {
		let too_big = Literal::Number(Number::parse("3000000000").unwrap());
		let declared = resolve(decl("_i", Some(PropertyType::Int), Some(too_big.clone())));
		let inferred = resolve(decl("_i", None, Some(too_big)));

		assert!(matches!(declared, Err(Error::TypeMismatch { expected: PropertyType::Int, .. })));
		assert!(matches!(inferred, Err(Error::TypeMismatch { expected: PropertyType::Int, .. })));

		let smallest = resolve(decl("_i", None, Some(Literal::Number(Number::int(i32::MIN))))).unwrap();
		assert_eq!(smallest.default, Some(Value::Int(i32::MIN)));
	}

	#[test]
	fn explicit_float_accepts_integer_literal() {
		let property = resolve(decl("_f", Some(PropertyType::Float), Some(Literal::Number(Number::int(2))))).unwrap();
		assert_eq!(property.default, Some(Value::Float(2.0)));
	}

	#[test]
	fn arity_mismatch() {
		match resolve(decl("_v2", Some(PropertyType::Vec2), Some(tuple(&[1.0, 2.0, 3.0])))) {
			Err(Error::TypeMismatch { name, expected, found, .. }) => {
				assert_eq!(name, "_v2");
				assert_eq!(expected, PropertyType::Vec2);
				assert_eq!(found, "a 3-component tuple");
			}
			other => panic!("{:?}", other),
		}
	}

	#[test]
	fn texture_wants_a_name() {
		let texture = resolve(decl("_tex", Some(PropertyType::Texture2D), Some(Literal::String("white".to_owned())))).unwrap();
		assert_eq!(texture.default, Some(Value::Texture2D("white".to_owned())));

		let numeric = resolve(decl("_tex", Some(PropertyType::Texture2D), Some(Literal::Number(Number::int(0)))));
		assert!(matches!(numeric, Err(Error::TypeMismatch { .. })));
	}

	#[test]
	fn ambiguous_defaults() {
		let string = resolve(decl("_s", None, Some(Literal::String("white".to_owned()))));
		let five = resolve(decl("_t", None, Some(tuple(&[1.0, 2.0, 3.0, 4.0, 5.0]))));
		let missing = resolve(decl("_m", None, None));

		assert!(matches!(string, Err(Error::AmbiguousDefault { .. })));
		assert!(matches!(five, Err(Error::AmbiguousDefault { .. })));
		assert!(matches!(missing, Err(Error::AmbiguousDefault { .. })));
	}

	#[test]
	fn explicit_type_without_default() {
		let property = resolve(decl("_tex", Some(PropertyType::Texture2D), None)).unwrap();
		assert_eq!(property.default, None);
	}
}
