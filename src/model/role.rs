#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Employee = 0,
    Admin = 1,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Role::Employee),
            1 => Some(Role::Admin),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_round_trip_and_reject_unknown() {
        assert_eq!(Role::from_id(0), Some(Role::Employee));
        assert_eq!(Role::from_id(1), Some(Role::Admin));
        assert_eq!(Role::from_id(Role::Admin as u8), Some(Role::Admin));
        assert_eq!(Role::from_id(7), None);
    }
}
