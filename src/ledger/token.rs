use super::Address;

/// A decoded value as returned by a contract read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address(Address),
    String(String),
    Bool(bool),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    pub fn type_name(&self) -> &'static str {
        match self {
            Token::Uint(_) => "uint",
            Token::Address(_) => "address",
            Token::String(_) => "string",
            Token::Bool(_) => "bool",
            Token::Array(_) => "array",
            Token::Tuple(_) => "tuple",
        }
    }
}
