//! Mapping of raw contract values onto the canonical [`Property`] shape.
//!
//! Deployed contract variants return records either as 7 positional fields
//! (with one image string or an image array) or as the 8-field struct getter
//! with the id in front. All of them decode to the same type.

use std::vec::IntoIter;

use crate::{
    ledger::{Address, Token},
    property::{AssetRef, Property, PropertyId},
    units::MinorUnits,
};

fn unexpected(field: &str, expected: &str, got: &Token) -> String {
    format!("field `{field}`: expected {expected}, got {}", got.type_name())
}

struct Fields {
    iter: IntoIter<Token>,
}

impl Fields {
    fn next(&mut self, field: &str) -> Result<Token, String> {
        self.iter
            .next()
            .ok_or_else(|| format!("field `{field}` is missing"))
    }

    fn string(&mut self, field: &str) -> Result<String, String> {
        match self.next(field)? {
            Token::String(value) => Ok(value),
            other => Err(unexpected(field, "string", &other)),
        }
    }

    fn uint(&mut self, field: &str) -> Result<u128, String> {
        match self.next(field)? {
            Token::Uint(value) => Ok(value),
            other => Err(unexpected(field, "uint", &other)),
        }
    }

    fn address(&mut self, field: &str) -> Result<Address, String> {
        match self.next(field)? {
            Token::Address(value) => Ok(value),
            other => Err(unexpected(field, "address", &other)),
        }
    }

    fn bool(&mut self, field: &str) -> Result<bool, String> {
        match self.next(field)? {
            Token::Bool(value) => Ok(value),
            other => Err(unexpected(field, "bool", &other)),
        }
    }

    fn assets(&mut self, field: &str) -> Result<Vec<AssetRef>, String> {
        match self.next(field)? {
            Token::String(value) if value.is_empty() => Ok(Vec::new()),
            Token::String(value) => Ok(vec![AssetRef::new(value)]),
            Token::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Token::String(value) => Ok(AssetRef::new(value)),
                    other => Err(unexpected(field, "string items", &other)),
                })
                .collect(),
            other => Err(unexpected(field, "string or string array", &other)),
        }
    }
}

pub(crate) fn count(token: Token) -> Result<u64, String> {
    match token {
        Token::Uint(value) => {
            u64::try_from(value).map_err(|_| format!("count {value} does not fit in u64"))
        }
        other => Err(format!("expected uint, got {}", other.type_name())),
    }
}

pub(crate) fn address(token: Token) -> Result<Address, String> {
    match token {
        Token::Address(value) => Ok(value),
        other => Err(format!("expected address, got {}", other.type_name())),
    }
}

pub(crate) fn property(id: PropertyId, token: Token) -> Result<Property, String> {
    let fields = match token {
        Token::Tuple(fields) => fields,
        other => return Err(format!("expected tuple, got {}", other.type_name())),
    };
    let with_id = match fields.len() {
        7 => false,
        8 => true,
        n => return Err(format!("expected 7 or 8 fields, got {n}")),
    };

    let mut fields = Fields {
        iter: fields.into_iter(),
    };
    if with_id {
        let record_id = fields.uint("id")?;
        if record_id != u128::from(id) {
            return Err(format!("record id {record_id} does not match requested id {id}"));
        }
    }

    Ok(Property {
        id,
        name: fields.string("name")?,
        location: fields.string("location")?,
        price: MinorUnits(fields.uint("price")?),
        asset_refs: fields.assets("image")?,
        description: fields.string("description")?,
        owner: fields.address("owner")?,
        is_listed_for_sale: fields.bool("isAvailable")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::repeat_byte(0x0e);

    fn positional(image: Token) -> Vec<Token> {
        vec![
            Token::String("Dune Cottage".to_string()),
            Token::String("Sylt".to_string()),
            Token::Uint(750_000_000_000_000_000),
            image,
            Token::String("Sea view".to_string()),
            Token::Address(OWNER),
            Token::Bool(true),
        ]
    }

    #[test]
    fn decode_every_layout() {
        let single = property(3, Token::Tuple(positional(Token::String("QmDune".to_string()))))
            .unwrap();
        assert_eq!(single.asset_refs, vec![AssetRef::new("QmDune")]);
        assert_eq!(single.price_display(), "0.75");
        assert_eq!(single.owner, OWNER);
        assert!(single.is_listed_for_sale);

        let list = property(
            3,
            Token::Tuple(positional(Token::Array(vec![
                Token::String("QmDune".to_string()),
                Token::String("QmDune2".to_string()),
            ]))),
        )
        .unwrap();
        assert_eq!(list.asset_refs.len(), 2);

        let mut with_id = positional(Token::String("QmDune".to_string()));
        with_id.insert(0, Token::Uint(3));
        assert_eq!(property(3, Token::Tuple(with_id)).unwrap(), single);
    }

    #[test]
    fn reject_wrong_shapes() {
        let err = property(1, Token::Tuple(vec![Token::Bool(true)])).unwrap_err();
        assert_eq!(err, "expected 7 or 8 fields, got 1");

        let err = property(1, Token::Uint(1)).unwrap_err();
        assert_eq!(err, "expected tuple, got uint");

        let mut fields = positional(Token::String(String::new()));
        fields[2] = Token::String("1 ETH".to_string());
        let err = property(1, Token::Tuple(fields)).unwrap_err();
        assert_eq!(err, "field `price`: expected uint, got string");

        let mut with_id = positional(Token::String(String::new()));
        with_id.insert(0, Token::Uint(9));
        assert!(property(1, Token::Tuple(with_id)).is_err());

        assert!(count(Token::Uint(u128::MAX)).is_err());
        assert!(address(Token::Bool(false)).is_err());
    }
}
