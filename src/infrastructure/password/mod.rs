mod bcrypt;

pub use bcrypt::BcryptPasswordHasher;
