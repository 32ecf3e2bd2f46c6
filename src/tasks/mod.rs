mod room_reaper;

pub use room_reaper::RoomReaperTask;
