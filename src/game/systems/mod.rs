pub mod damage;
pub mod inventory;
pub mod lifecycle;
pub mod melee;
pub mod physics;
pub mod projectile;
pub mod weapons;
