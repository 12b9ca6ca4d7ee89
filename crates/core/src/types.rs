//! Type table for the C subset.
//!
//! Types are interned: every distinct type is stored once and referred to
//! by an opaque [`TypeId`] handle. The scalar classes are pre-seeded at
//! fixed ids so the rest of the compiler can name them as constants.
//! Composite types (pointers, arrays, structures, functions) are deduped on
//! insertion, which makes type equality a handle comparison.

/// Opaque handle into a [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const INT: TypeId = TypeId(1);
    pub const FLOAT: TypeId = TypeId(2);
    pub const CHAR: TypeId = TypeId(3);
    pub const BOOL: TypeId = TypeId(4);
    pub const NULLPTR: TypeId = TypeId(5);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A member of a structure type: interned member name plus member type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: TypeId,
}

/// The recognized type classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit IEEE double.
    Floating,
    /// Character, stored as an integer.
    Character,
    /// Boolean, stored as an integer.
    Boolean,
    /// Type of the null pointer literal only.
    NullPointer,
    Pointer(TypeId),
    /// One dimension per wrapper; multi-dimensional arrays nest.
    Array(TypeId),
    Structure(Vec<Member>),
    Function {
        returns: TypeId,
        params: Vec<TypeId>,
        /// Built-in variadics (`printf`-style) accept extra arguments after
        /// the fixed parameters. User functions are never variadic.
        variadic: bool,
    },
}

/// Interning table of types.
#[derive(Debug, Default)]
pub struct TypeTable {
    entries: Vec<Type>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable {
            entries: vec![
                Type::Void,
                Type::Integer,
                Type::Floating,
                Type::Character,
                Type::Boolean,
                Type::NullPointer,
            ],
        }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.entries[id.index()]
    }

    fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(pos) = self.entries.iter().position(|t| *t == ty) {
            return TypeId(pos as u32);
        }
        self.entries.push(ty);
        TypeId((self.entries.len() - 1) as u32)
    }

    pub fn pointer_to(&mut self, elem: TypeId) -> TypeId {
        self.intern(Type::Pointer(elem))
    }

    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(Type::Array(elem))
    }

    pub fn structure(&mut self, members: Vec<Member>) -> TypeId {
        self.intern(Type::Structure(members))
    }

    pub fn function(&mut self, returns: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Type::Function {
            returns,
            params,
            variadic: false,
        })
    }

    pub fn variadic_function(&mut self, returns: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Type::Function {
            returns,
            params,
            variadic: true,
        })
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// Integer class: `int`, `char` and `_Bool` all live in integer
    /// registers and fold as integers.
    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Type::Integer | Type::Character | Type::Boolean
        )
    }

    pub fn is_floating(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Floating)
    }

    pub fn is_arithmetic(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_floating(id)
    }

    pub fn is_null_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::NullPointer)
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pointer(_))
    }

    pub fn is_scalar(&self, id: TypeId) -> bool {
        self.is_arithmetic(id) || self.is_pointer(id) || self.is_null_pointer(id)
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Array(_))
    }

    pub fn is_structure(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Structure(_))
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Function { .. })
    }

    pub fn is_struct_pointer(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Pointer(elem) => self.is_structure(*elem),
            _ => false,
        }
    }

    /// A string literal has type `Array(Integer)`.
    pub fn is_string(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Array(elem) => matches!(self.get(*elem), Type::Integer),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Component accessors
    // ------------------------------------------------------------------

    pub fn pointer_element(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Pointer(elem) => *elem,
            _ => panic!("pointer_element on non-pointer type"),
        }
    }

    pub fn array_element(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Array(elem) => *elem,
            _ => panic!("array_element on non-array type"),
        }
    }

    pub fn members(&self, id: TypeId) -> &[Member] {
        match self.get(id) {
            Type::Structure(members) => members,
            _ => panic!("members on non-structure type"),
        }
    }

    /// Index of a named member, if the structure has one.
    pub fn member_index(&self, id: TypeId, name: &str) -> Option<usize> {
        self.members(id).iter().position(|m| m.name == name)
    }

    pub fn function_return(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Function { returns, .. } => *returns,
            _ => panic!("function_return on non-function type"),
        }
    }

    pub fn function_params(&self, id: TypeId) -> &[TypeId] {
        match self.get(id) {
            Type::Function { params, .. } => params,
            _ => panic!("function_params on non-function type"),
        }
    }

    pub fn function_is_variadic(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Function { variadic, .. } => *variadic,
            _ => false,
        }
    }

    /// Storage size in bytes. The data word is 4 bytes, floating values
    /// occupy two words, structures are the sum of their member sizes.
    /// Arrays are represented by a one-word pointer in the variable slot;
    /// their element storage is laid out separately.
    pub fn size_of(&self, id: TypeId) -> usize {
        match self.get(id) {
            Type::Floating => 8,
            Type::Structure(members) => members.iter().map(|m| self.size_of(m.ty)).sum(),
            _ => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_types_are_interned() {
        let mut types = TypeTable::new();
        let p1 = types.pointer_to(TypeId::INT);
        let p2 = types.pointer_to(TypeId::INT);
        assert_eq!(p1, p2);

        let a1 = types.array_of(TypeId::FLOAT);
        let a2 = types.array_of(TypeId::FLOAT);
        assert_eq!(a1, a2);
        assert_ne!(p1, a1);
    }

    #[test]
    fn test_scalar_predicates() {
        let mut types = TypeTable::new();
        assert!(types.is_arithmetic(TypeId::INT));
        assert!(types.is_arithmetic(TypeId::FLOAT));
        assert!(types.is_integer(TypeId::CHAR));
        assert!(types.is_integer(TypeId::BOOL));
        assert!(!types.is_arithmetic(TypeId::VOID));

        let ptr = types.pointer_to(TypeId::INT);
        assert!(types.is_scalar(ptr));
        assert!(types.is_scalar(TypeId::NULLPTR));
        assert!(!types.is_scalar(TypeId::VOID));
    }

    #[test]
    fn test_struct_pointer_and_string() {
        let mut types = TypeTable::new();
        let st = types.structure(vec![
            Member {
                name: "x".to_string(),
                ty: TypeId::INT,
            },
            Member {
                name: "y".to_string(),
                ty: TypeId::FLOAT,
            },
        ]);
        let ptr = types.pointer_to(st);
        assert!(types.is_struct_pointer(ptr));
        assert_eq!(types.size_of(st), 12);

        let s = types.array_of(TypeId::INT);
        assert!(types.is_string(s));
        let not_s = types.array_of(TypeId::FLOAT);
        assert!(!types.is_string(not_s));
    }

    #[test]
    fn test_member_lookup() {
        let mut types = TypeTable::new();
        let st = types.structure(vec![
            Member {
                name: "re".to_string(),
                ty: TypeId::FLOAT,
            },
            Member {
                name: "im".to_string(),
                ty: TypeId::FLOAT,
            },
        ]);
        assert_eq!(types.member_index(st, "im"), Some(1));
        assert_eq!(types.member_index(st, "abs"), None);
    }
}
