//! The C type system.

use std::rc::Rc;

use cc_interner::Name;

#[derive(Clone, Debug)]
pub struct Member {
    pub name: Name,
    pub ty: Rc<Type>,
    pub offset: u64,
}

#[derive(Clone, Debug)]
pub enum Type {
    Void,
    Int { signed: bool, width: u32 },
    Float { width: u32 },
    Pointer(Rc<Type>),
    Array { elem: Rc<Type>, len: Option<u64> },
    Function { ret: Rc<Type>, params: Vec<Rc<Type>>, variadic: bool },
    Struct { tag: Option<Name>, members: Rc<Vec<Member>>, size: u64, align: u64, is_union: bool },
    Enum { tag: Option<Name> },
}

impl Type {
    pub fn void() -> Rc<Type> {
        Rc::new(Type::Void)
    }
    pub fn char() -> Rc<Type> {
        Rc::new(Type::Int { signed: true, width: 1 })
    }
    pub fn uchar() -> Rc<Type> {
        Rc::new(Type::Int { signed: false, width: 1 })
    }
    pub fn short() -> Rc<Type> {
        Rc::new(Type::Int { signed: true, width: 2 })
    }
    pub fn int() -> Rc<Type> {
        Rc::new(Type::Int { signed: true, width: 4 })
    }
    pub fn uint() -> Rc<Type> {
        Rc::new(Type::Int { signed: false, width: 4 })
    }
    pub fn long() -> Rc<Type> {
        Rc::new(Type::Int { signed: true, width: 8 })
    }
    pub fn ulong() -> Rc<Type> {
        Rc::new(Type::Int { signed: false, width: 8 })
    }
    pub fn float() -> Rc<Type> {
        Rc::new(Type::Float { width: 4 })
    }
    pub fn double() -> Rc<Type> {
        Rc::new(Type::Float { width: 8 })
    }
    pub fn pointer_to(t: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Pointer(t))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::Enum { .. })
    }
    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }
    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_float()
    }
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }
    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }
    pub fn is_struct_union(&self) -> bool {
        matches!(self, Type::Struct { .. })
    }
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    /// Size in bytes of a *complete* type, which callers rely on for
    /// arithmetic; incomplete arrays/structs panic (caller
    /// must check `is_complete` first — an incomplete type reaching codegen
    /// is an internal invariant violation, not a user error, because sema
    /// rejects it earlier).
    pub fn size(&self) -> u64 {
        match self {
            Type::Void => 1,
            Type::Int { width, .. } => *width as u64,
            Type::Float { width } => *width as u64,
            Type::Pointer(_) => 8,
            Type::Array { elem, len } => elem.size() * len.expect("size of incomplete array"),
            Type::Function { .. } => 1,
            Type::Struct { size, .. } => *size,
            Type::Enum { .. } => 4,
        }
    }

    pub fn align(&self) -> u64 {
        match self {
            Type::Struct { align, .. } => *align,
            Type::Array { elem, .. } => elem.align(),
            other => other.size().min(8).max(1),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Type::Void => false,
            Type::Array { len, .. } => len.is_some(),
            _ => true,
        }
    }

    /// What `t` decays to as an rvalue: array-to-pointer decay, or
    /// function-to-pointer decay.
    pub fn decay(self: &Rc<Type>) -> Rc<Type> {
        match self.as_ref() {
            Type::Array { elem, .. } => Type::pointer_to(elem.clone()),
            Type::Function { .. } => Type::pointer_to(self.clone()),
            _ => self.clone(),
        }
    }

    pub fn members(&self) -> Option<&[Member]> {
        match self {
            Type::Struct { members, .. } => Some(members),
            _ => None,
        }
    }
}

/// Usual arithmetic conversions: the common type is the wider operand,
/// with ties broken toward unsigned.
pub fn usual_arith_conv(a: &Rc<Type>, b: &Rc<Type>) -> Rc<Type> {
    if a.is_float() || b.is_float() {
        let wa = if let Type::Float { width } = a.as_ref() { *width } else { 0 };
        let wb = if let Type::Float { width } = b.as_ref() { *width } else { 0 };
        return if wa.max(wb) >= 8 { Type::double() } else { Type::float() };
    }
    let pa = promote(a);
    let pb = promote(b);
    let (Type::Int { signed: sa, width: wa }, Type::Int { signed: sb, width: wb }) =
        (pa.as_ref(), pb.as_ref())
    else {
        return Type::int();
    };
    let width = (*wa).max(*wb);
    let signed = if wa == wb { *sa && *sb } else if wa > wb { *sa } else { *sb };
    Rc::new(Type::Int { signed, width })
}

/// Integer promotion: anything narrower than int widens to int.
pub fn promote(t: &Rc<Type>) -> Rc<Type> {
    match t.as_ref() {
        Type::Int { width, .. } if *width < 4 => Type::int(),
        Type::Enum { .. } => Type::int(),
        _ => t.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_widens_narrow_ints() {
        let t = promote(&Type::char());
        matches!(t.as_ref(), Type::Int { width: 4, .. });
    }

    #[test]
    fn usual_conversion_prefers_wider_then_unsigned() {
        let t = usual_arith_conv(&Type::int(), &Type::long());
        assert_eq!(t.size(), 8);
        let t2 = usual_arith_conv(&Type::uint(), &Type::int());
        if let Type::Int { signed, width } = t2.as_ref() {
            assert_eq!(*width, 4);
            assert!(!signed);
        } else {
            panic!();
        }
    }

    #[test]
    fn struct_layout_invariant() {
        let members = vec![
            Member { name: Name::default(), ty: Type::char(), offset: 0 },
            Member { name: Name::default(), ty: Type::int(), offset: 4 },
        ];
        let st = Type::Struct {
            tag: None,
            members: Rc::new(members),
            size: 8,
            align: 4,
            is_union: false,
        };
        assert_eq!(st.size() % st.align(), 0);
    }
}
