//! Group-wide ordering properties checked over seeded simulations.
