use alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256 balance);
        function decimals() external view returns (uint8 decimals);
        function symbol() external view returns (string symbol);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool success);
        function transfer(address to, uint256 amount) external returns (bool success);
    }
}

sol! {
    interface ILPFarming {
        function deposit(uint256 amount, uint256 periodDays) external;
        function claimRewards() external;
        function reinvestRewards(uint256 periodDays) external;
        function withdrawCapital(uint256 investmentId) external;
        function getUserInvestments(address user) external view returns (
            uint256[] ids,
            uint256[] amounts,
            uint256[] startTimes,
            uint256[] endTimes,
            uint256[] periods,
            uint256[] aprs,
            bool[] activeStatus
        );
        function getUserBalance(address user) external view returns (
            uint256 totalInvested,
            uint256 pendingRewards,
            uint256 totalEarned,
            uint256 activeInvestments
        );
        function getDailyYield(address user) external view returns (uint256 dailyYield);
    }
}
