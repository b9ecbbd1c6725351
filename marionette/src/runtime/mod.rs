mod animation;
mod animation_state;
mod bounds;
mod skeleton;

pub use animation::*;
pub use animation_state::*;
pub use bounds::*;
pub use skeleton::*;


#[cfg(test)]
mod ik_tests;

#[cfg(test)]
mod constraint_tests;




#[cfg(test)]
mod deform_tests;

#[cfg(test)]
mod bounds_tests;
