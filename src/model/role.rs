#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    User = 1,
    Clocker = 2,
    Admin = 3,
    SuperAdmin = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::User),
            2 => Some(Role::Clocker),
            3 => Some(Role::Admin),
            4 => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// May record punches for other people (keypad flow, batch page).
    pub fn can_clock(self) -> bool {
        matches!(self, Role::Clocker | Role::Admin | Role::SuperAdmin)
    }

    /// May manage the directory and edit or delete records.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}
