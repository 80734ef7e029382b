mod inmemory;

pub use inmemory::InMemoryChatRepository;
